use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, ListResponse, found, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::rbac::{STAFF, require_role};
use crate::repo::deals::{self, DealFilter, DealInput, DealRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/deals", get(list_deals).post(create_deal))
        .route(
            "/api/deals/{id}",
            get(get_deal).put(update_deal).delete(delete_deal),
        )
}

fn validate(body: &DealInput, creating: bool) -> Result<(), ApiError> {
    let mut checks = Checks::new();
    if creating {
        checks.required("title", body.title.as_deref());
    }
    checks
        .opt(body.title.as_deref(), |v| validation::check_name("title", v))
        .opt(body.amount, |v| validation::check_non_negative("amount", v))
        .opt(body.status.as_deref(), |v| {
            validation::check_one_of("status", v, deals::STATUSES)
        })
        .finish()
}

async fn list_deals(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<DealFilter>,
) -> Result<Json<ListResponse<DealRow>>, ApiError> {
    require_role(&auth, STAFF)?;
    Ok(Json(deals::list(&state.pool, &filter).await?.into()))
}

async fn get_deal(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DealRow>, ApiError> {
    require_role(&auth, STAFF)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<DealRow, ApiError> {
    deals::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("deal".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_deal(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(mut body): ApiJson<DealInput>,
) -> Result<(StatusCode, Json<DealRow>), ApiError> {
    require_role(&auth, STAFF)?;
    validate(&body, true)?;
    body.owner_id = body.owner_id.or(Some(auth.user_id));

    let id = deals::create(&state.pool, &body).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "deal.create", "deal", Some(id)).detail(serde_json::json!({
            "title": body.title,
            "amount": body.amount,
        })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_deal(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<DealInput>,
) -> Result<Json<DealRow>, ApiError> {
    require_role(&auth, STAFF)?;
    validate(&body, false)?;
    found(deals::update(&state.pool, id, &body).await?, "deal")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "deal.update", "deal", Some(id)).detail(serde_json::json!({
            "status": body.status,
            "amount": body.amount,
        })),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state), err)]
async fn delete_deal(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, STAFF)?;
    found(deals::delete(&state.pool, id).await?, "deal")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "deal.delete", "deal", Some(id)),
    )
    .await;
    Ok(ok())
}
