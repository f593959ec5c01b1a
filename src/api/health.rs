use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::ApiError;
use crate::repo::comms::{self, Channel};
use crate::store::{AppState, pool};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub queued_sms: i64,
    pub queued_email: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/health", get(health))
}

/// Unauthenticated; 503 when the database does not answer.
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    if let Err(e) = pool::ping(&state.pool).await {
        tracing::warn!(error = %e, "health check: database unreachable");
        return Err(ApiError::ServiceUnavailable("database unavailable".into()));
    }

    let queued_sms = comms::queued_count(&state.pool, Channel::Sms).await?;
    let queued_email = comms::queued_count(&state.pool, Channel::Email).await?;

    Ok(Json(HealthResponse {
        status: "ok",
        database: "ok",
        queued_sms,
        queued_email,
    }))
}

pub async fn fallback() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "success": false, "error": "route not found" })),
    )
}
