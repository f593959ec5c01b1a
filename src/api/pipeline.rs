use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, found, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::notify::dispatch;
use crate::rbac::{MANAGEMENT, PORTAL, STAFF, require_role};
use crate::repo::pipeline::{self, BoardColumn, MoveOutcome};
use crate::repo::stages::{self, StageInput, StageRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub application_id: Uuid,
    pub stage_id: Uuid,
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub stage_ids: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/pipeline", get(board))
        .route("/api/pipeline/move", post(move_application))
        .route(
            "/api/pipeline/stages",
            get(list_stages).post(create_stage),
        )
        .route("/api/pipeline/stages/reorder", put(reorder_stages))
        .route(
            "/api/pipeline/stages/{id}",
            get(get_stage).put(update_stage).delete(delete_stage),
        )
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

async fn board(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<BoardColumn>>, ApiError> {
    require_role(&auth, PORTAL)?;
    Ok(Json(pipeline::board(&state.pool).await?))
}

#[tracing::instrument(skip(state, body), fields(application_id = %body.application_id), err)]
async fn move_application(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<MoveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, STAFF)?;
    let outcome =
        pipeline::move_application(&state.pool, body.application_id, body.stage_id, body.position)
            .await?;

    after_move(&state, &auth, body.application_id, &outcome).await;

    Ok(Json(serde_json::json!({
        "ok": true,
        "application_id": body.application_id,
        "stage_id": outcome.to_stage,
        "position": outcome.position,
    })))
}

/// Audit entry plus assignee notification for a completed move.
pub(crate) async fn after_move(
    state: &AppState,
    auth: &AuthUser,
    application_id: Uuid,
    outcome: &MoveOutcome,
) {
    write_audit(
        &state.pool,
        &AuditEntry::by(auth, "application.move", "application", Some(application_id)).detail(
            serde_json::json!({
                "from": outcome.from_stage,
                "to": outcome.to_stage,
                "position": outcome.position,
            }),
        ),
    )
    .await;

    if let Some(assignee) = outcome.assigned_to
        && assignee != auth.user_id
    {
        let stage_name = match stages::get(&state.pool, outcome.to_stage).await {
            Ok(Some(stage)) => stage.name,
            _ => outcome.to_stage.to_string(),
        };
        dispatch::on_application_moved(state, assignee, application_id, &stage_name, &auth.user_name)
            .await;
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn validate(body: &StageInput, creating: bool) -> Result<(), ApiError> {
    let mut checks = Checks::new();
    if creating {
        checks.required("name", body.name.as_deref());
    }
    checks
        .opt(body.name.as_deref(), |v| validation::check_name("name", v))
        .opt(body.color.as_deref(), validation::check_color)
        .opt(body.position, |v| {
            validation::check_non_negative("position", i64::from(v))
        })
        .finish()
}

async fn list_stages(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<StageRow>>, ApiError> {
    require_role(&auth, PORTAL)?;
    Ok(Json(stages::list(&state.pool).await?))
}

async fn get_stage(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<StageRow>, ApiError> {
    require_role(&auth, PORTAL)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<StageRow, ApiError> {
    stages::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("stage".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_stage(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<StageInput>,
) -> Result<(StatusCode, Json<StageRow>), ApiError> {
    require_role(&auth, MANAGEMENT)?;
    validate(&body, true)?;

    let id = stages::create(&state.pool, &body).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "stage.create", "stage", Some(id))
            .detail(serde_json::json!({"name": body.name})),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_stage(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<StageInput>,
) -> Result<Json<StageRow>, ApiError> {
    require_role(&auth, MANAGEMENT)?;
    validate(&body, false)?;
    found(stages::update(&state.pool, id, &body).await?, "stage")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "stage.update", "stage", Some(id)).detail(serde_json::json!({
            "name": body.name,
            "color": body.color,
            "is_terminal": body.is_terminal,
        })),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state, body), err)]
async fn reorder_stages(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ReorderRequest>,
) -> Result<Json<Vec<StageRow>>, ApiError> {
    require_role(&auth, MANAGEMENT)?;
    if body.stage_ids.is_empty() {
        return Err(ApiError::BadRequest("stage_ids must not be empty".into()));
    }
    let mut seen = std::collections::HashSet::new();
    if !body.stage_ids.iter().all(|id| seen.insert(*id)) {
        return Err(ApiError::BadRequest("stage_ids contains duplicates".into()));
    }

    let updated = stages::reorder(&state.pool, &body.stage_ids).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "stage.reorder", "stage", None)
            .detail(serde_json::json!({"stage_ids": body.stage_ids, "updated": updated})),
    )
    .await;

    Ok(Json(stages::list(&state.pool).await?))
}

/// Fails with 409 while applications still sit in the stage.
#[tracing::instrument(skip(state), err)]
async fn delete_stage(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, MANAGEMENT)?;
    let stage = fetch(&state, id).await?;
    if stage.application_count > 0 {
        return Err(ApiError::Conflict(format!(
            "stage still holds {} application(s)",
            stage.application_count
        )));
    }
    found(stages::delete(&state.pool, id).await?, "stage")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "stage.delete", "stage", Some(id))
            .detail(serde_json::json!({"name": stage.name})),
    )
    .await;
    Ok(ok())
}
