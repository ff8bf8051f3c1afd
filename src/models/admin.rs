use serde::Serialize;

use crate::models::OrderStatus;

#[derive(Debug, Default, Serialize, sqlx::FromRow)]
pub struct ProductStats {
    pub total: i64,
    pub draft: i64,
    pub active: i64,
    pub archived: i64,
    pub low_stock: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OrderStatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RevenueByCurrency {
    pub currency: String,
    /// Minor units.
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub products: ProductStats,
    pub orders: Vec<OrderStatusCount>,
    pub revenue: Vec<RevenueByCurrency>,
    pub customers: i64,
}
