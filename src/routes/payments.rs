use std::collections::HashMap;

use axum::{extract::State, Extension, Json};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        CheckoutItem, CreateOrderRequest, CreateOrderResponse, KeyResponse, OrderItemData,
        Product, ProductStatus, ShippingDetails, VerifyPaymentRequest, VerifyPaymentResponse,
    },
    queries::{
        order_queries::{self, PaymentOutcome},
        products_queries,
    },
    services::razorpay_service,
    utils::jwt::Claims,
    AppState,
};

pub async fn get_key(State(state): State<AppState>) -> Json<KeyResponse> {
    Json(KeyResponse {
        key: state.razorpay.key_id.clone(),
    })
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>> {
    let amount = razorpay_service::to_minor_units(payload.amount)?;
    let currency = razorpay_service::normalize_currency(payload.currency.as_deref())?;
    let receipt = razorpay_service::normalize_receipt(payload.receipt.as_deref())?;

    if let Some(ref shipping) = payload.shipping {
        validate_shipping(shipping)?;
    }

    let items = if payload.items.is_empty() {
        Vec::new()
    } else {
        let ids: Vec<Uuid> = payload.items.iter().map(|i| i.product_id).collect();
        let products = products_queries::find_by_ids(&state.db, &ids).await?;
        let (items, total) = price_items(&payload.items, &products)?;

        if razorpay_service::to_minor_units(total)? != amount {
            return Err(AppError::BadRequest(
                "Amount does not match cart total".to_string(),
            ));
        }

        items
    };

    let gateway_order =
        razorpay_service::create_order(&state.http, &state.razorpay, amount, &currency, &receipt)
            .await?;

    let order = order_queries::create_order_with_items(
        &state.db,
        &claims.sub,
        &gateway_order,
        &receipt,
        payload.shipping.as_ref(),
        &items,
    )
    .await?;

    tracing::info!(
        "Order {} ({}) created for {}: {} {}",
        order.id,
        gateway_order.id,
        claims.sub,
        gateway_order.amount,
        gateway_order.currency
    );

    Ok(Json(CreateOrderResponse {
        order_id: gateway_order.id,
        amount: gateway_order.amount,
        currency: gateway_order.currency,
        receipt: gateway_order.receipt.unwrap_or(receipt),
        key: state.razorpay.key_id.clone(),
    }))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>> {
    let authentic = razorpay_service::verify_payment_signature(
        &state.razorpay.key_secret,
        &payload.razorpay_order_id,
        &payload.razorpay_payment_id,
        &payload.razorpay_signature,
    );

    if !authentic {
        tracing::warn!(
            "Invalid payment signature for order {} from {}",
            payload.razorpay_order_id,
            claims.sub
        );
        return Err(AppError::BadRequest("Invalid payment signature".to_string()));
    }

    let outcome = order_queries::mark_paid_and_deduct_stock(
        &state.db,
        &payload.razorpay_order_id,
        &payload.razorpay_payment_id,
    )
    .await?;

    Ok(Json(payment_response(outcome, payload, &claims.sub)?))
}

/// A valid signature means the gateway captured the payment, so every
/// outcome except an order that can no longer be paid is a success.
fn payment_response(
    outcome: PaymentOutcome,
    payload: VerifyPaymentRequest,
    caller: &str,
) -> Result<VerifyPaymentResponse> {
    match outcome {
        PaymentOutcome::Paid { order, short_stock } => {
            if order.user_uid != caller {
                tracing::warn!(
                    "Order {} of {} verified by {}",
                    order.id,
                    order.user_uid,
                    caller
                );
            }
            if !short_stock.is_empty() {
                tracing::warn!(
                    "Insufficient stock for paid order {}: {:?}",
                    order.id,
                    short_stock
                );
            }
            tracing::info!(
                "Order {} paid with {}",
                order.id,
                payload.razorpay_payment_id
            );
        }
        PaymentOutcome::AlreadyPaid(order) => {
            tracing::info!("Order {} already verified", order.id);
        }
        PaymentOutcome::NotPayable(order) => {
            return Err(AppError::Conflict(format!(
                "Order is {} and cannot be paid",
                order.status.as_str()
            )));
        }
        PaymentOutcome::NotFound => {
            tracing::warn!(
                "Verified payment {} for unknown order {}",
                payload.razorpay_payment_id,
                payload.razorpay_order_id
            );
        }
    }

    Ok(VerifyPaymentResponse {
        success: true,
        order_id: payload.razorpay_order_id,
        payment_id: payload.razorpay_payment_id,
    })
}

/// Prices checkout lines against the catalog and returns them with the
/// cart total in major units.
fn price_items(
    items: &[CheckoutItem],
    products: &HashMap<Uuid, Product>,
) -> Result<(Vec<OrderItemData>, Decimal)> {
    // Aggregate demand per product for the stock check
    let mut demand: HashMap<Uuid, i32> = HashMap::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest(format!(
                "Invalid quantity for product {}",
                item.product_id
            )));
        }
        let entry = demand.entry(item.product_id).or_insert(0);
        *entry = entry.saturating_add(item.quantity);
    }

    let mut total = Decimal::ZERO;
    let mut priced = Vec::with_capacity(items.len());

    for item in items {
        let product = products
            .get(&item.product_id)
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", item.product_id)))?;

        if product.status != ProductStatus::Active {
            return Err(AppError::BadRequest(format!(
                "Product {} is not available",
                product.title
            )));
        }

        if !product.can_fulfil(demand[&item.product_id]) {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.title
            )));
        }

        for (name, value) in &item.variant {
            let known = product
                .variants
                .iter()
                .any(|v| v.name == *name && v.values.contains(value));
            if !known {
                return Err(AppError::BadRequest(format!(
                    "Unknown option {}={} for {}",
                    name, value, product.title
                )));
            }
        }

        total += product.price * Decimal::from(item.quantity);

        priced.push(OrderItemData {
            product_id: product.id,
            title: product.title.clone(),
            quantity: item.quantity,
            unit_price: product.price,
            variant: item.variant.clone(),
        });
    }

    Ok((priced, total))
}

fn validate_shipping(shipping: &ShippingDetails) -> Result<()> {
    let required = [
        ("name", &shipping.name),
        ("phone", &shipping.phone),
        ("address", &shipping.address),
        ("city", &shipping.city),
        ("state", &shipping.state),
    ];

    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("Shipping {} is required", field)));
        }
    }

    if !shipping.email.contains('@') {
        return Err(AppError::BadRequest("Invalid shipping email".to_string()));
    }

    let pincode = shipping.pincode.trim();
    if pincode.len() != 6 || !pincode.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest("Pincode must be 6 digits".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use sqlx::types::Json;

    use super::*;
    use crate::models::{Category, Order, OrderStatus, Variant};

    fn product(price: &str, stock: i32) -> Product {
        Product {
            id: Uuid::new_v4(),
            title: "Chanderi Dupatta".to_string(),
            description: String::new(),
            category: Category::Women,
            collection: Some("Festive".to_string()),
            price: price.parse().unwrap(),
            cost: "300".parse().unwrap(),
            stock_quantity: stock,
            track_quantity: true,
            continue_selling: false,
            has_sku: false,
            sku: None,
            images: Json(Vec::new()),
            variants: Json(vec![Variant {
                name: "Colour".to_string(),
                values: vec!["Mustard".to_string(), "Teal".to_string()],
            }]),
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn order(status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_uid: "uid-42".to_string(),
            gateway_order_id: "order_N1".to_string(),
            receipt: "rcpt_1".to_string(),
            amount: 49_900,
            currency: "INR".to_string(),
            status,
            payment_id: Some("pay_P1".to_string()),
            shipping: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn verification() -> VerifyPaymentRequest {
        VerifyPaymentRequest {
            razorpay_order_id: "order_N1".to_string(),
            razorpay_payment_id: "pay_P1".to_string(),
            razorpay_signature: String::new(),
        }
    }

    fn line(product: &Product, quantity: i32) -> CheckoutItem {
        CheckoutItem {
            product_id: product.id,
            quantity,
            variant: BTreeMap::new(),
        }
    }

    fn catalog(products: &[&Product]) -> HashMap<Uuid, Product> {
        products.iter().map(|p| (p.id, (*p).clone())).collect()
    }

    #[test]
    fn test_total_uses_catalog_prices() {
        let a = product("799.50", 10);
        let b = product("1200", 10);

        let (items, total) =
            price_items(&[line(&a, 2), line(&b, 1)], &catalog(&[&a, &b])).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(total, "2799.00".parse::<Decimal>().unwrap());
        assert_eq!(razorpay_service::to_minor_units(total).unwrap(), 279_900);
    }

    #[test]
    fn test_stock_checked_against_aggregated_demand() {
        let a = product("100", 3);

        assert!(price_items(&[line(&a, 2), line(&a, 1)], &catalog(&[&a])).is_ok());
        assert!(price_items(&[line(&a, 2), line(&a, 2)], &catalog(&[&a])).is_err());
    }

    #[test]
    fn test_inactive_or_missing_product_rejected() {
        let mut draft = product("100", 3);
        draft.status = ProductStatus::Draft;
        assert!(price_items(&[line(&draft, 1)], &catalog(&[&draft])).is_err());

        let missing = product("100", 3);
        assert!(matches!(
            price_items(&[line(&missing, 1)], &HashMap::new()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let a = product("100", 3);
        assert!(price_items(&[line(&a, 0)], &catalog(&[&a])).is_err());
    }

    #[test]
    fn test_variant_options_must_exist() {
        let a = product("100", 3);

        let mut ok = line(&a, 1);
        ok.variant.insert("Colour".to_string(), "Teal".to_string());
        assert!(price_items(&[ok], &catalog(&[&a])).is_ok());

        let mut bad = line(&a, 1);
        bad.variant.insert("Colour".to_string(), "Crimson".to_string());
        assert!(price_items(&[bad], &catalog(&[&a])).is_err());
    }

    #[test]
    fn test_shipping_validation() {
        let mut shipping = ShippingDetails {
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone: "9800000000".to_string(),
            address: "12 Weavers Lane".to_string(),
            city: "Varanasi".to_string(),
            state: "UP".to_string(),
            pincode: "221001".to_string(),
        };
        assert!(validate_shipping(&shipping).is_ok());

        shipping.pincode = "22100".to_string();
        assert!(validate_shipping(&shipping).is_err());

        shipping.pincode = "221001".to_string();
        shipping.city = " ".to_string();
        assert!(validate_shipping(&shipping).is_err());
    }

    #[test]
    fn test_paid_order_verifies() {
        let outcome = PaymentOutcome::Paid {
            order: order(OrderStatus::Paid),
            short_stock: vec![Uuid::new_v4()],
        };

        let response = payment_response(outcome, verification(), "uid-42").unwrap();
        assert!(response.success);
        assert_eq!(response.order_id, "order_N1");
        assert_eq!(response.payment_id, "pay_P1");
    }

    #[test]
    fn test_repeated_verification_is_idempotent() {
        let outcome = PaymentOutcome::AlreadyPaid(order(OrderStatus::Paid));

        let response = payment_response(outcome, verification(), "uid-42").unwrap();
        assert!(response.success);
        assert_eq!(response.payment_id, "pay_P1");
    }

    #[test]
    fn test_unknown_order_with_valid_signature_succeeds() {
        let response = payment_response(PaymentOutcome::NotFound, verification(), "uid-42").unwrap();
        assert!(response.success);
        assert_eq!(response.order_id, "order_N1");
    }

    #[test]
    fn test_cancelled_order_conflicts() {
        let outcome = PaymentOutcome::NotPayable(order(OrderStatus::Cancelled));

        match payment_response(outcome, verification(), "uid-42") {
            Err(AppError::Conflict(message)) => {
                assert_eq!(message, "Order is cancelled and cannot be paid")
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }
}
