use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    models::UserRole,
    session::SessionState,
    utils::jwt::{self, Claims},
    AppState,
};

/// Verifies the bearer token and counts the request as session activity.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &req)?;
    touch_session(&state, &claims)?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Verifies the bearer token without counting as activity.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &req)?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

pub async fn admin_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &req)?;

    if claims.role != UserRole::Admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    touch_session(&state, &claims)?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

fn authenticate(state: &AppState, req: &Request) -> Result<Claims, AppError> {
    let auth_header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid token format".to_string()))?;

    jwt::verify_token(&state.identity, token)
}

fn touch_session(state: &AppState, claims: &Claims) -> Result<(), AppError> {
    let now = Instant::now();
    match state
        .sessions
        .touch(&claims.session_key(), claims.expires_at(now), now)
    {
        SessionState::Expired => {
            tracing::info!("Session of {} expired due to inactivity", claims.sub);
            Err(AppError::Unauthorized(
                "Session expired due to inactivity".to_string(),
            ))
        }
        _ => Ok(()),
    }
}
