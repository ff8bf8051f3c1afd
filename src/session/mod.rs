mod policy;
mod tracker;

pub use policy::{InactivityPolicy, SessionState, SessionStatusResponse};
pub use tracker::{spawn_sweeper, SessionTracker};
