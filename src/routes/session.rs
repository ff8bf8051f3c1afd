use std::time::Instant;

use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::{
    error::{AppError, Result},
    session::{SessionState, SessionStatusResponse},
    utils::jwt::Claims,
    AppState,
};

pub async fn session_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SessionStatusResponse>> {
    let now = Instant::now();
    match state
        .sessions
        .peek(&claims.session_key(), claims.expires_at(now), now)
    {
        SessionState::Expired => Err(AppError::Unauthorized(
            "Session expired due to inactivity".to_string(),
        )),
        current => Ok(Json(current.to_response())),
    }
}

/// The activity itself was recorded by the auth middleware.
pub async fn keepalive(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<SessionStatusResponse> {
    let now = Instant::now();
    Json(
        state
            .sessions
            .peek(&claims.session_key(), claims.expires_at(now), now)
            .to_response(),
    )
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> StatusCode {
    state
        .sessions
        .end(&claims.session_key(), claims.expires_at(Instant::now()));
    tracing::info!("{} signed out", claims.sub);

    StatusCode::NO_CONTENT
}
