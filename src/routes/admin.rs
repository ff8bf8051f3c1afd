use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        DashboardStats, Order, OrderQuery, OrderSearchResponse, UpdateOrderStatusRequest,
        UpdateRoleRequest, UserProfile, UserQuery, UserSearchResponse,
    },
    queries::{admin_queries, order_queries, user_queries},
    routes::users::validate_business_fields,
    utils::jwt::Claims,
    AppState,
};

pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>> {
    let stats = admin_queries::dashboard_stats(&state.db).await?;

    Ok(Json(stats))
}

//ORDER ROUTES
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrderQuery>,
) -> Result<Json<OrderSearchResponse>> {
    let orders = admin_queries::get_orders(&state.db, params).await?;

    Ok(Json(orders))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>> {
    let order = order_queries::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order with id {} not found", id)))?;

    if order.status == payload.status {
        return Ok(Json(order));
    }

    if !order.status.can_transition_to(payload.status) {
        return Err(AppError::BadRequest(format!(
            "Cannot move order from {} to {}",
            order.status.as_str(),
            payload.status.as_str()
        )));
    }

    let updated = order_queries::update_status(&state.db, &order, payload.status)
        .await?
        .ok_or_else(|| AppError::Conflict("Order was modified concurrently".to_string()))?;

    tracing::info!(
        "Order {} moved from {} to {}",
        id,
        order.status.as_str(),
        updated.status.as_str()
    );

    Ok(Json(updated))
}

//USER ROUTES
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<UserSearchResponse>> {
    let users = user_queries::search_users(&state.db, params).await?;

    Ok(Json(users))
}

pub async fn update_user_role(
    State(state): State<AppState>,
    axum::Extension(claims): axum::Extension<Claims>,
    Path(uid): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserProfile>> {
    if uid == claims.sub && payload.role != claims.role {
        return Err(AppError::BadRequest(
            "Admins cannot change their own role".to_string(),
        ));
    }

    let existing = user_queries::find_by_uid(&state.db, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;

    validate_business_fields(
        payload.role,
        existing.company_name.as_deref(),
        existing.gst_number.as_deref(),
    )?;

    let profile = user_queries::update_role(&state.db, &uid, payload.role)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;

    tracing::info!("Role of {} set to {:?} by {}", uid, profile.role, claims.sub);

    Ok(Json(profile))
}
