use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ShippingDetails;

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub key: String,
}

/// A cart line sent at checkout. Carts themselves live on the client.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub variant: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Major units, e.g. rupees.
    pub amount: Decimal,
    pub currency: Option<String>,
    pub receipt: Option<String>,
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    pub shipping: Option<ShippingDetails>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    /// Minor units, e.g. paise.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub order_id: String,
    pub payment_id: String,
}

// Gateway payloads

#[derive(Debug, Serialize)]
pub struct GatewayOrderRequest<'a> {
    pub amount: i64,
    pub currency: &'a str,
    pub receipt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct GatewayErrorBody {
    pub error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct GatewayErrorDetail {
    pub code: Option<String>,
    pub description: Option<String>,
}
