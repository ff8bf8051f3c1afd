use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        GatewayOrder, Order, OrderItem, OrderItemData, OrderResponse, OrderStatus,
        ShippingDetails,
    },
};

/// What payment verification did to the local order.
#[derive(Debug)]
pub enum PaymentOutcome {
    /// Moved to `paid`. Lists tracked products that were short on stock.
    Paid { order: Order, short_stock: Vec<Uuid> },
    AlreadyPaid(Order),
    /// The order exists but is no longer awaiting payment.
    NotPayable(Order),
    NotFound,
}

/// Stock columns of one product, locked while an order is being paid.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub(crate) struct StockLevel {
    pub stock_quantity: i32,
    pub track_quantity: bool,
    pub continue_selling: bool,
}

impl StockLevel {
    /// Units to take for `quantity` ordered, or `None` when a tracked
    /// product cannot cover it. Overselling never drives stock below zero.
    pub(crate) fn deduction(&self, quantity: i32) -> Option<i32> {
        if !self.track_quantity {
            return Some(0);
        }
        if self.stock_quantity >= quantity {
            return Some(quantity);
        }
        if self.continue_selling {
            return Some(self.stock_quantity.max(0));
        }
        None
    }
}

pub async fn create_order_with_items(
    pool: &PgPool,
    user_uid: &str,
    gateway_order: &GatewayOrder,
    receipt: &str,
    shipping: Option<&ShippingDetails>,
    items: &[OrderItemData],
) -> Result<Order> {
    let mut tx = pool.begin().await?;

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, user_uid, gateway_order_id, receipt, amount, currency, shipping)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user_uid)
    .bind(&gateway_order.id)
    .bind(receipt)
    .bind(gateway_order.amount)
    .bind(&gateway_order.currency)
    .bind(shipping.map(Json))
    .fetch_one(&mut *tx)
    .await?;

    if !items.is_empty() {
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        let quantities: Vec<i32> = items.iter().map(|i| i.quantity).collect();
        let prices: Vec<Decimal> = items.iter().map(|i| i.unit_price).collect();
        let variants: Vec<serde_json::Value> = items
            .iter()
            .map(|i| serde_json::json!(i.variant))
            .collect();

        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, title, quantity, unit_price, variant)
             SELECT $1, unnest($2::uuid[]), unnest($3::varchar[]), unnest($4::int[]), unnest($5::numeric[]), unnest($6::jsonb[])",
        )
        .bind(order.id)
        .bind(&product_ids)
        .bind(&titles)
        .bind(&quantities)
        .bind(&prices)
        .bind(&variants)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(order)
}

pub async fn find_by_gateway_id(pool: &PgPool, gateway_order_id: &str) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE gateway_order_id = $1")
        .bind(gateway_order_id)
        .fetch_optional(pool)
        .await?;

    Ok(order)
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(order)
}

/// Marks the order paid and deducts stock in one transaction.
pub async fn mark_paid_and_deduct_stock(
    pool: &PgPool,
    gateway_order_id: &str,
    payment_id: &str,
) -> Result<PaymentOutcome> {
    let mut tx = pool.begin().await?;

    // Only a still-created order moves, so repeated verification is harmless.
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = 'paid', payment_id = $1, updated_at = NOW()
         WHERE gateway_order_id = $2 AND status = 'created' RETURNING *",
    )
    .bind(payment_id)
    .bind(gateway_order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let order = match order {
        Some(order) => order,
        None => {
            tx.commit().await?;
            return Ok(match find_by_gateway_id(pool, gateway_order_id).await? {
                Some(existing) if existing.payment_id.as_deref() == Some(payment_id) => {
                    PaymentOutcome::AlreadyPaid(existing)
                }
                Some(existing) => PaymentOutcome::NotPayable(existing),
                None => PaymentOutcome::NotFound,
            });
        }
    };

    let items = items_in_tx(&mut tx, order.id).await?;
    let mut short_stock = Vec::new();

    for item in &items {
        let level = sqlx::query_as::<_, StockLevel>(
            "SELECT stock_quantity, track_quantity, continue_selling
             FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(item.product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let deducted = match level.map(|level| level.deduction(item.quantity)) {
            Some(Some(units)) => units,
            Some(None) => {
                short_stock.push(item.product_id);
                0
            }
            // Product deleted since checkout
            None => 0,
        };

        if deducted > 0 {
            sqlx::query(
                "UPDATE products SET stock_quantity = stock_quantity - $1, updated_at = NOW()
                 WHERE id = $2",
            )
            .bind(deducted)
            .bind(item.product_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE order_items SET stock_deducted = $1 WHERE id = $2")
                .bind(deducted)
                .bind(item.id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(PaymentOutcome::Paid { order, short_stock })
}

/// Applies an admin status change. Cancelling an order that already holds
/// stock puts back exactly what payment took. Returns `None` when the order changed status
/// concurrently.
pub async fn update_status(
    pool: &PgPool,
    order: &Order,
    next: OrderStatus,
) -> Result<Option<Order>> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $1, updated_at = NOW()
         WHERE id = $2 AND status = $3 RETURNING *",
    )
    .bind(next)
    .bind(order.id)
    .bind(order.status)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(updated) = updated else {
        tx.rollback().await?;
        return Ok(None);
    };

    if next == OrderStatus::Cancelled && order.status.holds_stock() {
        for item in items_in_tx(&mut tx, order.id).await? {
            if item.stock_deducted == 0 {
                continue;
            }

            sqlx::query(
                "UPDATE products SET stock_quantity = stock_quantity + $1, updated_at = NOW()
                 WHERE id = $2",
            )
            .bind(item.stock_deducted)
            .bind(item.product_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE order_items SET stock_deducted = 0 WHERE id = $1")
                .bind(item.id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(Some(updated))
}

pub async fn get_user_orders(pool: &PgPool, user_uid: &str) -> Result<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_uid = $1 AND status != 'created' ORDER BY created_at DESC",
    )
    .bind(user_uid)
    .fetch_all(pool)
    .await?;

    Ok(orders)
}

pub async fn get_items_for_orders(pool: &PgPool, order_ids: &[Uuid]) -> Result<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY id",
    )
    .bind(order_ids)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

pub async fn with_items(pool: &PgPool, orders: Vec<Order>) -> Result<Vec<OrderResponse>> {
    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let all_items = get_items_for_orders(pool, &order_ids).await?;

    let mut items_map: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in all_items {
        items_map.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = items_map.remove(&order.id).unwrap_or_default();
            OrderResponse { order, items }
        })
        .collect())
}

async fn items_in_tx(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> Result<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

    Ok(items)
}
