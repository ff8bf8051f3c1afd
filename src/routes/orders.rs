use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::OrderResponse,
    queries::order_queries,
    utils::jwt::Claims,
    AppState,
};

pub async fn get_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<OrderResponse>>> {
    let orders = order_queries::get_user_orders(&state.db, &claims.sub).await?;
    let response = order_queries::with_items(&state.db, orders).await?;

    Ok(Json(response))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>> {
    // Someone else's order is reported as missing.
    let order = order_queries::find_by_id(&state.db, id)
        .await?
        .filter(|order| order.user_uid == claims.sub)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    let response = order_queries::with_items(&state.db, vec![order])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    Ok(Json(response))
}
