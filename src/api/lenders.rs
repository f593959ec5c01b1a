use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, ListResponse, found, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::rbac::{MANAGEMENT, PORTAL, STAFF, require_role};
use crate::repo::lenders::{self, LenderFilter, LenderInput, LenderRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/lenders", get(list_lenders).post(create_lender))
        .route(
            "/api/lenders/{id}",
            get(get_lender).put(update_lender).delete(delete_lender),
        )
}

/// `current` supplies the stored bounds so a partial update cannot invert
/// the range.
fn validate(body: &LenderInput, current: Option<&LenderRow>) -> Result<(), ApiError> {
    let mut checks = Checks::new();
    if current.is_none() {
        checks.required("name", body.name.as_deref());
    }
    let min = body.min_amount.or(current.and_then(|c| c.min_amount));
    let max = body.max_amount.or(current.and_then(|c| c.max_amount));
    checks
        .opt(body.name.as_deref(), |v| validation::check_name("name", v))
        .opt(body.email.as_deref(), validation::check_email)
        .opt(body.phone.as_deref(), validation::check_phone)
        .opt(body.website.as_deref(), validation::check_url)
        .opt(body.min_amount, |v| validation::check_non_negative("min_amount", v))
        .opt(body.max_amount, |v| validation::check_non_negative("max_amount", v))
        .add(validation::check_range("amount", min, max))
        .finish()
}

async fn list_lenders(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<LenderFilter>,
) -> Result<Json<ListResponse<LenderRow>>, ApiError> {
    require_role(&auth, PORTAL)?;
    Ok(Json(lenders::list(&state.pool, &filter).await?.into()))
}

async fn get_lender(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<LenderRow>, ApiError> {
    require_role(&auth, PORTAL)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<LenderRow, ApiError> {
    lenders::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("lender".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_lender(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<LenderInput>,
) -> Result<(StatusCode, Json<LenderRow>), ApiError> {
    require_role(&auth, STAFF)?;
    validate(&body, None)?;

    let id = lenders::create(&state.pool, &body).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "lender.create", "lender", Some(id))
            .detail(serde_json::json!({"name": body.name})),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_lender(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<LenderInput>,
) -> Result<Json<LenderRow>, ApiError> {
    require_role(&auth, STAFF)?;
    let current = fetch(&state, id).await?;
    validate(&body, Some(&current))?;
    found(lenders::update(&state.pool, id, &body).await?, "lender")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "lender.update", "lender", Some(id)).detail(serde_json::json!({
            "name": body.name,
            "is_active": body.is_active,
        })),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state), err)]
async fn delete_lender(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, MANAGEMENT)?;
    found(lenders::delete(&state.pool, id).await?, "lender")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "lender.delete", "lender", Some(id)),
    )
    .await;
    Ok(ok())
}
