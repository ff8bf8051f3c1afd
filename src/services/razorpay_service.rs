use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use sha2::Sha256;

use crate::{
    config::RazorpayConfig,
    error::{AppError, Result},
    models::{GatewayErrorBody, GatewayOrder, GatewayOrderRequest},
};

type HmacSha256 = Hmac<Sha256>;

/// Receipts longer than this are rejected by the gateway.
pub const MAX_RECEIPT_LEN: usize = 40;

/// Hex HMAC-SHA256 of `order_id|payment_id`, the signature the checkout
/// widget hands back after a successful payment.
pub fn sign_payment(secret: &str, order_id: &str, payment_id: &str) -> Result<String> {
    let mac = payment_mac(secret, order_id, payment_id)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    if signature.len() != 64 {
        return false;
    }

    let expected = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    match payment_mac(secret, order_id, payment_id) {
        // Constant-time comparison.
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

fn payment_mac(secret: &str, order_id: &str, payment_id: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::ConfigError(format!("Invalid payment secret: {}", e)))?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Ok(mac)
}

/// Major units to minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Amount must be greater than zero".to_string(),
        ));
    }

    let minor = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| AppError::BadRequest("Amount is too large".to_string()))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AppError::BadRequest("Amount is too large".to_string()))?;

    if minor <= 0 {
        return Err(AppError::BadRequest(
            "Amount must be at least one minor currency unit".to_string(),
        ));
    }

    Ok(minor)
}

pub fn normalize_currency(currency: Option<&str>) -> Result<String> {
    let currency = currency.map(str::trim).filter(|c| !c.is_empty()).unwrap_or("INR");

    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest(format!(
            "Invalid currency code: {}",
            currency
        )));
    }

    Ok(currency.to_ascii_uppercase())
}

pub fn normalize_receipt(receipt: Option<&str>) -> Result<String> {
    match receipt.map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) if r.len() > MAX_RECEIPT_LEN => Err(AppError::BadRequest(format!(
            "Receipt must be at most {} characters",
            MAX_RECEIPT_LEN
        ))),
        Some(r) => Ok(r.to_string()),
        None => Ok(format!("rcpt_{}", uuid::Uuid::new_v4().simple())),
    }
}

pub async fn create_order(
    client: &reqwest::Client,
    config: &RazorpayConfig,
    amount: i64,
    currency: &str,
    receipt: &str,
) -> Result<GatewayOrder> {
    let response = client
        .post(format!("{}/orders", config.api_base))
        .basic_auth(&config.key_id, Some(&config.key_secret))
        .json(&GatewayOrderRequest {
            amount,
            currency,
            receipt,
        })
        .send()
        .await
        .map_err(|e| AppError::GatewayError(format!("Razorpay request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response
            .json::<GatewayErrorBody>()
            .await
            .ok()
            .map(|body| {
                format!(
                    "{}: {}",
                    body.error.code.unwrap_or_default(),
                    body.error.description.unwrap_or_default()
                )
            })
            .unwrap_or_else(|| "unreadable error body".to_string());

        return Err(AppError::GatewayError(format!(
            "Razorpay order creation failed with {}: {}",
            status, detail
        )));
    }

    let order = response
        .json::<GatewayOrder>()
        .await
        .map_err(|e| AppError::GatewayError(format!("Failed to parse Razorpay response: {}", e)))?;

    tracing::info!(
        "Razorpay order {} created: amount={} {} receipt={:?} status={}",
        order.id,
        order.amount,
        order.currency,
        order.receipt,
        order.status
    );

    Ok(order)
}
