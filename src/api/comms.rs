//! SMS and email endpoints. Sending only enqueues; delivery happens in the
//! outbox worker.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, ListResponse, found};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::rbac::{CRM, require_role};
use crate::repo::comms::{self, Channel, EmailRow, LogFilter, STATUSES, SmsRow, StatusUpdate};
use crate::repo::contacts;
use crate::store::AppState;
use crate::validation::{self, Checks};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    pub contact_id: Option<Uuid>,
    /// Defaults to the contact's phone number.
    pub to: Option<String>,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub contact_id: Option<Uuid>,
    /// Defaults to the contact's email address.
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sms", get(list_sms).post(send_sms))
        .route("/api/sms/{id}", get(get_sms))
        .route("/api/sms/{id}/status", put(sms_status))
        .route("/api/email", get(list_email).post(send_email))
        .route("/api/email/{id}", get(get_email))
        .route("/api/email/{id}/status", put(email_status))
}

/// Explicit recipient wins; otherwise look it up on the contact.
async fn resolve_recipient(
    state: &AppState,
    explicit: Option<String>,
    contact_id: Option<Uuid>,
    channel: Channel,
) -> Result<String, ApiError> {
    if let Some(to) = explicit {
        return Ok(to);
    }
    let Some(contact_id) = contact_id else {
        return Err(ApiError::Validation(vec![
            "either to or contact_id is required".into(),
        ]));
    };
    let on_file = match channel {
        Channel::Sms => contacts::phone(&state.pool, contact_id).await?,
        Channel::Email => contacts::email(&state.pool, contact_id).await?,
    };
    on_file.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "contact has no {} on file",
            match channel {
                Channel::Sms => "phone number",
                Channel::Email => "email address",
            }
        ))
    })
}

fn check_status(update: &StatusUpdate) -> Result<(), ApiError> {
    Checks::new()
        .add(validation::check_one_of("status", &update.status, STATUSES))
        .opt(update.provider_id.as_deref(), |v| {
            validation::check_length("provider_id", v, 1, 255)
        })
        .finish()
}

// ---------------------------------------------------------------------------
// SMS
// ---------------------------------------------------------------------------

async fn list_sms(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<LogFilter>,
) -> Result<Json<ListResponse<SmsRow>>, ApiError> {
    require_role(&auth, CRM)?;
    Ok(Json(comms::list_sms(&state.pool, &filter).await?.into()))
}

async fn get_sms(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SmsRow>, ApiError> {
    require_role(&auth, CRM)?;
    comms::get_sms(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("sms".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn send_sms(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<SendSmsRequest>,
) -> Result<(StatusCode, Json<SmsRow>), ApiError> {
    require_role(&auth, CRM)?;
    Checks::new()
        .add(validation::check_length("body", &body.body, 1, 1600))
        .opt(body.to.as_deref(), validation::check_phone)
        .finish()?;

    let to = resolve_recipient(&state, body.to, body.contact_id, Channel::Sms).await?;
    let row = comms::enqueue_sms(&state.pool, body.contact_id, &to, &body.body, auth.user_id).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "sms.create", "sms", Some(row.id))
            .detail(serde_json::json!({"contact_id": row.contact_id, "to": row.to_number})),
    )
    .await;

    Ok((StatusCode::ACCEPTED, Json(row)))
}

#[tracing::instrument(skip(state, body), err)]
async fn sms_status(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<StatusUpdate>,
) -> Result<Json<SmsRow>, ApiError> {
    require_role(&auth, CRM)?;
    check_status(&body)?;
    found(comms::set_status(&state.pool, Channel::Sms, id, &body).await?, "sms")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "sms.status", "sms", Some(id))
            .detail(serde_json::json!({"status": body.status, "provider_id": body.provider_id})),
    )
    .await;

    comms::get_sms(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("sms".into()))
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

async fn list_email(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<LogFilter>,
) -> Result<Json<ListResponse<EmailRow>>, ApiError> {
    require_role(&auth, CRM)?;
    Ok(Json(comms::list_email(&state.pool, &filter).await?.into()))
}

async fn get_email(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<EmailRow>, ApiError> {
    require_role(&auth, CRM)?;
    comms::get_email(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("email".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn send_email(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<SendEmailRequest>,
) -> Result<(StatusCode, Json<EmailRow>), ApiError> {
    require_role(&auth, CRM)?;
    Checks::new()
        .add(validation::check_length("subject", &body.subject, 1, 255))
        .add(validation::check_length("body", &body.body, 1, 100_000))
        .opt(body.to.as_deref(), validation::check_email)
        .finish()?;
    if body.subject.contains(['\r', '\n']) {
        return Err(ApiError::Validation(vec![
            "subject must be a single line".into(),
        ]));
    }

    let to = resolve_recipient(&state, body.to, body.contact_id, Channel::Email).await?;
    let row = comms::enqueue_email(
        &state.pool,
        body.contact_id,
        &to,
        &body.subject,
        &body.body,
        auth.user_id,
    )
    .await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "email.create", "email", Some(row.id)).detail(serde_json::json!({
            "contact_id": row.contact_id,
            "to": row.to_address,
            "subject": row.subject,
        })),
    )
    .await;

    Ok((StatusCode::ACCEPTED, Json(row)))
}

#[tracing::instrument(skip(state, body), err)]
async fn email_status(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<StatusUpdate>,
) -> Result<Json<EmailRow>, ApiError> {
    require_role(&auth, CRM)?;
    check_status(&body)?;
    found(comms::set_status(&state.pool, Channel::Email, id, &body).await?, "email")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "email.status", "email", Some(id))
            .detail(serde_json::json!({"status": body.status, "provider_id": body.provider_id})),
    )
    .await;

    comms::get_email(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("email".into()))
}
