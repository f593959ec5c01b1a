use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, ListResponse, found, ok};
use crate::api::pipeline::after_move;
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::notify::dispatch;
use crate::rbac::{PORTAL, STAFF, require_role};
use crate::repo::applications::{self, ApplicationFilter, ApplicationInput, ApplicationRow};
use crate::repo::{pipeline, stages};
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/applications",
            get(list_applications).post(create_application),
        )
        .route(
            "/api/applications/{id}",
            get(get_application)
                .put(update_application)
                .delete(delete_application),
        )
}

fn validate(body: &ApplicationInput) -> Result<(), ApiError> {
    Checks::new()
        .opt(body.amount_requested, |v| {
            validation::check_non_negative("amount_requested", v)
        })
        .opt(body.status.as_deref(), |v| {
            validation::check_one_of("status", v, applications::STATUSES)
        })
        .opt(body.purpose.as_deref(), |v| {
            validation::check_length("purpose", v, 0, 2000)
        })
        .finish()
}

async fn list_applications(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<ApplicationFilter>,
) -> Result<Json<ListResponse<ApplicationRow>>, ApiError> {
    require_role(&auth, PORTAL)?;
    Ok(Json(applications::list(&state.pool, &filter).await?.into()))
}

async fn get_application(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApplicationRow>, ApiError> {
    require_role(&auth, PORTAL)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<ApplicationRow, ApiError> {
    applications::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("application".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_application(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ApplicationInput>,
) -> Result<(StatusCode, Json<ApplicationRow>), ApiError> {
    require_role(&auth, STAFF)?;
    validate(&body)?;

    let stage_id = match body.stage_id {
        Some(id) => id,
        None => stages::first(&state.pool)
            .await?
            .ok_or_else(|| ApiError::BadRequest("no pipeline stages configured".into()))?,
    };

    let id = applications::create(&state.pool, &body, stage_id, auth.user_id).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "application.create", "application", Some(id)).detail(
            serde_json::json!({
                "stage_id": stage_id,
                "amount_requested": body.amount_requested,
                "company_id": body.company_id,
            }),
        ),
    )
    .await;

    if let Some(assignee) = body.assigned_to
        && assignee != auth.user_id
    {
        dispatch::on_application_assigned(&state, assignee, id, &auth.user_name).await;
    }

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

/// Partial update. A changed `stage_id` is applied as a pipeline move to the
/// end of the target column; fields and move commit together.
#[tracing::instrument(skip(state, body), err)]
async fn update_application(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ApplicationInput>,
) -> Result<Json<ApplicationRow>, ApiError> {
    require_role(&auth, STAFF)?;
    validate(&body)?;
    let before = fetch(&state, id).await?;

    let mut tx = state.pool.begin().await?;
    found(applications::update(&mut *tx, id, &body).await?, "application")?;
    let moved = match body.stage_id {
        Some(stage_id) if stage_id != before.stage_id => {
            Some(pipeline::move_within(&mut *tx, id, stage_id, None).await?)
        }
        _ => None,
    };
    tx.commit().await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "application.update", "application", Some(id)).detail(
            serde_json::json!({
                "status": body.status,
                "assigned_to": body.assigned_to,
                "amount_requested": body.amount_requested,
            }),
        ),
    )
    .await;

    if let Some(outcome) = moved {
        after_move(&state, &auth, id, &outcome).await;
    }

    if let Some(assignee) = body.assigned_to
        && before.assigned_to != Some(assignee)
        && assignee != auth.user_id
    {
        dispatch::on_application_assigned(&state, assignee, id, &auth.user_name).await;
    }

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state), err)]
async fn delete_application(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, STAFF)?;
    found(applications::delete(&state.pool, id).await?, "application")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "application.delete", "application", Some(id)),
    )
    .await;
    Ok(ok())
}
