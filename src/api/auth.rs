use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::helpers::{ApiJson, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::{AuthUser, ClientIp};
use crate::auth::{password, token};
use crate::error::ApiError;
use crate::rbac::Role;
use crate::repo::users::{self, UserRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

const LOGIN_MAX_ATTEMPTS: u64 = 10;
const LOGIN_WINDOW: std::time::Duration = std::time::Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserRow,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/password", put(change_password))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, body), fields(email = %body.email), err)]
async fn login(
    State(state): State<AppState>,
    ClientIp(ip_addr): ClientIp,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = body.email.trim().to_lowercase();
    state
        .rate_limiter
        .check("login", &email, LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW)?;

    let creds = users::find_credentials(&state.pool, &email).await?;

    // Unknown emails still pay for one argon2 verification.
    let hash = creds
        .as_ref()
        .map_or(password::dummy_hash(), |c| c.password_hash.as_str());
    let password_valid =
        password::verify_password(&body.password, hash).map_err(ApiError::Internal)?;

    let creds = match creds {
        Some(c) if password_valid && c.is_active => c,
        _ => return Err(ApiError::Unauthorized),
    };

    let role: Role = creds.role.parse().map_err(|e: anyhow::Error| {
        tracing::warn!(user_id = %creds.id, error = %e, "login with unknown role");
        ApiError::Forbidden
    })?;

    let issued = token::issue(
        &state.config.jwt_secret,
        creds.id,
        &creds.email,
        role,
        Duration::hours(state.config.jwt_ttl_hours),
    )
    .map_err(ApiError::Internal)?;

    state.rate_limiter.reset("login", &email);
    users::touch_last_login(&state.pool, creds.id).await?;
    let user = users::get(&state.pool, creds.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor_id: user.id,
            actor_name: &user.name,
            action: "auth.login",
            resource: "user",
            resource_id: Some(user.id),
            detail: None,
            ip_addr: ip_addr.as_deref(),
        },
    )
    .await;

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user,
    }))
}

/// Tokens are stateless; logging out only records the event.
async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "auth.logout", "user", Some(auth.user_id)),
    )
    .await;
    Ok(ok())
}

async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UserRow>, ApiError> {
    let user = users::get(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user".into()))?;
    Ok(Json(user))
}

#[tracing::instrument(skip(state, body), fields(user_id = %auth.user_id), err)]
async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Checks::new()
        .add(validation::check_password(&body.new_password))
        .finish()?;

    let current = users::password_hash(&state.pool, auth.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !password::verify_password(&body.current_password, &current).map_err(ApiError::Internal)? {
        return Err(ApiError::BadRequest("current password is incorrect".into()));
    }

    let hash = password::hash_password(&body.new_password).map_err(ApiError::Internal)?;
    users::set_password(&state.pool, auth.user_id, &hash).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "auth.password_change", "user", Some(auth.user_id)),
    )
    .await;
    Ok(ok())
}
