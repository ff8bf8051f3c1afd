use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "product_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Men,
    Women,
    Living,
    Others,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Men,
        Category::Women,
        Category::Living,
        Category::Others,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "product_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub collection: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    pub stock_quantity: i32,
    pub track_quantity: bool,
    pub continue_selling: bool,
    pub has_sku: bool,
    pub sku: Option<String>,
    pub images: Json<Vec<String>>,
    pub variants: Json<Vec<Variant>>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn profit(&self) -> Decimal {
        self.price - self.cost
    }

    /// `profit / price` to four places, `None` for free products.
    pub fn margin(&self) -> Option<Decimal> {
        if self.price.is_zero() {
            return None;
        }
        Some((self.profit() / self.price).round_dp(4))
    }

    /// Whether `quantity` more units can be sold right now.
    pub fn can_fulfil(&self, quantity: i32) -> bool {
        !self.track_quantity || self.continue_selling || self.stock_quantity >= quantity
    }
}

/// Create and update payload. On update, absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct ProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub collection: Option<String>,
    pub price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub track_quantity: Option<bool>,
    pub continue_selling: Option<bool>,
    pub has_sku: Option<bool>,
    pub sku: Option<String>,
    pub images: Option<Vec<String>>,
    pub variants: Option<Vec<Variant>>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub product: Product,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub margin: Option<Decimal>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            profit: product.profit(),
            margin: product.margin(),
            product,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    PriceAsc,
    PriceDesc,
    Newest,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<Category>,
    pub status: Option<ProductStatus>,
    pub collection: Option<String>,
    pub q: Option<String>,
    pub sort: Option<SortBy>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProductSearchResponse {
    pub products: Vec<ProductResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CategoryCount {
    pub category: Category,
    pub count: i64,
}
