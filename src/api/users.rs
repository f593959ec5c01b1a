use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, ListResponse, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::auth::password;
use crate::error::ApiError;
use crate::rbac::{ADMIN, require_role};
use crate::repo::users::{self, NewUser, UserFilter, UserRow, UserUpdate};
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(deactivate_user),
        )
}

async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> Result<Json<ListResponse<UserRow>>, ApiError> {
    require_role(&auth, ADMIN)?;
    let page = users::list(&state.pool, &filter).await?;
    Ok(Json(page.into()))
}

async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<UserRow>, ApiError> {
    require_role(&auth, ADMIN)?;
    let user = users::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user".into()))?;
    Ok(Json(user))
}

#[tracing::instrument(skip(state, body), fields(email = %body.email), err)]
async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<UserRow>), ApiError> {
    require_role(&auth, ADMIN)?;
    Checks::new()
        .add(validation::check_email(&body.email))
        .add(validation::check_name("name", &body.name))
        .add(validation::check_password(&body.password))
        .opt(body.phone.as_deref(), validation::check_phone)
        .finish()?;

    let hash = password::hash_password(&body.password).map_err(ApiError::Internal)?;
    let user = users::create(&state.pool, &body, &hash).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "user.create", "user", Some(user.id))
            .detail(serde_json::json!({"email": user.email, "role": user.role})),
    )
    .await;

    Ok((StatusCode::CREATED, Json(user)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UserUpdate>,
) -> Result<Json<UserRow>, ApiError> {
    require_role(&auth, ADMIN)?;
    Checks::new()
        .opt(body.email.as_deref(), validation::check_email)
        .opt(body.name.as_deref(), |v| validation::check_name("name", v))
        .opt(body.password.as_deref(), validation::check_password)
        .opt(body.phone.as_deref(), validation::check_phone)
        .finish()?;

    if id == auth.user_id {
        if body.is_active == Some(false) {
            return Err(ApiError::BadRequest("cannot deactivate your own account".into()));
        }
        if body.role.is_some_and(|r| r != auth.role) {
            return Err(ApiError::BadRequest("cannot change your own role".into()));
        }
    }

    let hash = body
        .password
        .as_deref()
        .map(password::hash_password)
        .transpose()
        .map_err(ApiError::Internal)?;

    let user = users::update(&state.pool, id, &body, hash.as_deref())
        .await?
        .ok_or_else(|| ApiError::NotFound("user".into()))?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "user.update", "user", Some(id)).detail(serde_json::json!({
            "role": body.role.map(|r| r.as_str()),
            "is_active": body.is_active,
            "password_changed": body.password.is_some(),
        })),
    )
    .await;

    Ok(Json(user))
}

/// Users are never hard-deleted: audit rows and assignments keep pointing at them.
#[tracing::instrument(skip(state), err)]
async fn deactivate_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, ADMIN)?;
    if id == auth.user_id {
        return Err(ApiError::BadRequest("cannot deactivate your own account".into()));
    }
    if !users::deactivate(&state.pool, id).await? {
        return Err(ApiError::NotFound("user".into()));
    }

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "user.deactivate", "user", Some(id)),
    )
    .await;
    Ok(ok())
}
