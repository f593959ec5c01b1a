use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, CountResponse, ListResponse, found, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::notify::dispatch;
use crate::rbac::{PORTAL, require_role};
use crate::repo::messages::{self, MessageFilter, MessageRow, NewMessage};
use crate::repo::users;
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages", get(list_messages).post(send_message))
        .route("/api/messages/unread-count", get(unread_count))
        .route(
            "/api/messages/{id}",
            get(get_message).delete(delete_message),
        )
        .route("/api/messages/{id}/read", put(mark_read))
}

async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<MessageFilter>,
) -> Result<Json<ListResponse<MessageRow>>, ApiError> {
    require_role(&auth, PORTAL)?;
    let page = messages::list_for_user(&state.pool, auth.user_id, &filter).await?;
    Ok(Json(page.into()))
}

async fn get_message(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageRow>, ApiError> {
    require_role(&auth, PORTAL)?;
    fetch(&state, id, auth.user_id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid, user_id: Uuid) -> Result<MessageRow, ApiError> {
    messages::get_for_user(&state.pool, id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("message".into()))
}

async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CountResponse>, ApiError> {
    require_role(&auth, PORTAL)?;
    let count = messages::unread_count(&state.pool, auth.user_id).await?;
    Ok(Json(CountResponse { count }))
}

#[tracing::instrument(skip(state, body), fields(recipient = %body.recipient_id), err)]
async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<NewMessage>,
) -> Result<(StatusCode, Json<MessageRow>), ApiError> {
    require_role(&auth, PORTAL)?;
    Checks::new()
        .add(validation::check_length("body", body.body.trim(), 1, 10_000))
        .finish()?;
    if body.recipient_id == auth.user_id {
        return Err(ApiError::BadRequest("cannot message yourself".into()));
    }
    if !users::exists_active(&state.pool, body.recipient_id).await? {
        return Err(ApiError::NotFound("recipient".into()));
    }

    let id = messages::create(&state.pool, auth.user_id, &body).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "message.create", "message", Some(id)).detail(serde_json::json!({
            "recipient_id": body.recipient_id,
            "application_id": body.application_id,
        })),
    )
    .await;

    dispatch::on_message_received(&state, body.recipient_id, id, &auth.user_name).await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id, auth.user_id).await?)))
}

async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, PORTAL)?;
    found(messages::mark_read(&state.pool, id, auth.user_id).await?, "message")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "message.read", "message", Some(id)),
    )
    .await;
    Ok(ok())
}

/// Senders may retract their own messages.
#[tracing::instrument(skip(state), err)]
async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, PORTAL)?;
    found(messages::delete_sent(&state.pool, id, auth.user_id).await?, "message")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "message.delete", "message", Some(id)),
    )
    .await;
    Ok(ok())
}
