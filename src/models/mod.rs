mod admin;
mod order;
mod payment;
mod product;
mod user;

pub use admin::*;
pub use order::*;
pub use payment::*;
pub use product::*;
pub use user::*;
