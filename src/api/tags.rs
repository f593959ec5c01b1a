use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, found, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::rbac::{CRM, require_role};
use crate::repo::tags::{self, ENTITY_TYPES, TagInput, TagRow, TagTarget};
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tags", get(list_tags).post(create_tag))
        .route(
            "/api/tags/{id}",
            get(get_tag).put(update_tag).delete(delete_tag),
        )
        .route("/api/tags/{id}/assign", post(assign_tag))
        .route("/api/tags/{id}/unassign", post(unassign_tag))
}

fn validate(body: &TagInput, creating: bool) -> Result<(), ApiError> {
    let mut checks = Checks::new();
    if creating {
        checks.required("name", body.name.as_deref());
    }
    checks
        .opt(body.name.as_deref(), |v| validation::check_length("name", v, 1, 64))
        .opt(body.color.as_deref(), validation::check_color)
        .finish()
}

async fn list_tags(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<TagRow>>, ApiError> {
    require_role(&auth, CRM)?;
    Ok(Json(tags::list(&state.pool).await?))
}

async fn get_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TagRow>, ApiError> {
    require_role(&auth, CRM)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<TagRow, ApiError> {
    tags::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("tag".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<TagInput>,
) -> Result<(StatusCode, Json<TagRow>), ApiError> {
    require_role(&auth, CRM)?;
    validate(&body, true)?;

    let id = tags::create(&state.pool, &body).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "tag.create", "tag", Some(id))
            .detail(serde_json::json!({"name": body.name})),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<TagInput>,
) -> Result<Json<TagRow>, ApiError> {
    require_role(&auth, CRM)?;
    validate(&body, false)?;
    found(tags::update(&state.pool, id, &body).await?, "tag")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "tag.update", "tag", Some(id))
            .detail(serde_json::json!({"name": body.name, "color": body.color})),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state), err)]
async fn delete_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, CRM)?;
    found(tags::delete(&state.pool, id).await?, "tag")?;

    write_audit(&state.pool, &AuditEntry::by(&auth, "tag.delete", "tag", Some(id))).await;
    Ok(ok())
}

async fn check_target(state: &AppState, target: &TagTarget) -> Result<(), ApiError> {
    validation::check_one_of("entity_type", &target.entity_type, ENTITY_TYPES)?;
    if !tags::entity_exists(&state.pool, target).await? {
        return Err(ApiError::NotFound(target.entity_type.clone()));
    }
    Ok(())
}

#[tracing::instrument(skip(state, body), err)]
async fn assign_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<TagTarget>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, CRM)?;
    fetch(&state, id).await?;
    check_target(&state, &body).await?;

    let added = tags::assign(&state.pool, id, &body).await?;

    if added {
        write_audit(
            &state.pool,
            &AuditEntry::by(&auth, "tag.assign", "tag", Some(id)).detail(serde_json::json!({
                "entity_type": body.entity_type,
                "entity_id": body.entity_id,
            })),
        )
        .await;
    }
    Ok(Json(serde_json::json!({"ok": true, "added": added})))
}

#[tracing::instrument(skip(state, body), err)]
async fn unassign_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<TagTarget>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, CRM)?;
    validation::check_one_of("entity_type", &body.entity_type, ENTITY_TYPES)?;
    found(tags::unassign(&state.pool, id, &body).await?, "tag assignment")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "tag.unassign", "tag", Some(id)).detail(serde_json::json!({
            "entity_type": body.entity_type,
            "entity_id": body.entity_id,
        })),
    )
    .await;
    Ok(ok())
}
