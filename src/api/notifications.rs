use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, CountResponse, ListResponse, found, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::notify::dispatch::{self, NewNotification};
use crate::rbac::{PORTAL, STAFF, require_role};
use crate::repo::{notifications, users};
use crate::repo::notifications::{NotificationFilter, NotificationRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub subject: String,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub ref_type: Option<String>,
    pub ref_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications",
            get(list_notifications).post(create_notification),
        )
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", put(mark_all_read))
        .route(
            "/api/notifications/{id}",
            get(get_notification).delete(delete_notification),
        )
        .route("/api/notifications/{id}/read", put(mark_read))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<NotificationFilter>,
) -> Result<Json<ListResponse<NotificationRow>>, ApiError> {
    require_role(&auth, PORTAL)?;
    let page = notifications::list_for_user(&state.pool, auth.user_id, &filter).await?;
    Ok(Json(page.into()))
}

async fn get_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<NotificationRow>, ApiError> {
    require_role(&auth, PORTAL)?;
    // Someone else's notification is reported as missing.
    let row = notifications::get_for_user(&state.pool, id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("notification".into()))?;
    Ok(Json(row))
}

async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CountResponse>, ApiError> {
    require_role(&auth, PORTAL)?;
    let count = notifications::unread_count(&state.pool, auth.user_id).await?;
    Ok(Json(CountResponse { count }))
}

async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, PORTAL)?;
    found(
        notifications::mark_read(&state.pool, id, auth.user_id).await?,
        "notification",
    )?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "notification.read", "notification", Some(id)),
    )
    .await;
    Ok(ok())
}

async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, PORTAL)?;
    let updated = notifications::mark_all_read(&state.pool, auth.user_id).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "notification.read_all", "notification", None)
            .detail(serde_json::json!({"updated": updated})),
    )
    .await;
    Ok(Json(serde_json::json!({"ok": true, "updated": updated})))
}

#[tracing::instrument(skip(state), err)]
async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, PORTAL)?;
    found(
        notifications::delete_for_user(&state.pool, id, auth.user_id).await?,
        "notification",
    )?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "notification.delete", "notification", Some(id)),
    )
    .await;
    Ok(ok())
}

/// Staff can post a notification to any active user.
#[tracing::instrument(skip(state, body), fields(recipient = %body.user_id), err)]
async fn create_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationRow>), ApiError> {
    require_role(&auth, STAFF)?;
    Checks::new()
        .add(validation::check_length("subject", &body.subject, 1, 255))
        .opt(body.body.as_deref(), |v| validation::check_length("body", v, 0, 10_000))
        .opt(body.notification_type.as_deref(), |v| {
            validation::check_length("type", v, 1, 64)
        })
        .finish()?;

    if !users::exists_active(&state.pool, body.user_id).await? {
        return Err(ApiError::NotFound("user".into()));
    }

    let id = dispatch::notify(
        &state,
        &NewNotification {
            user_id: body.user_id,
            notification_type: body.notification_type.unwrap_or_else(|| "general".into()),
            subject: body.subject,
            body: body.body,
            ref_type: body.ref_type,
            ref_id: body.ref_id,
        },
    )
    .await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "notification.create", "notification", Some(id))
            .detail(serde_json::json!({"user_id": body.user_id})),
    )
    .await;

    let row = notifications::get_for_user(&state.pool, id, body.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("notification".into()))?;
    Ok((StatusCode::CREATED, Json(row)))
}
