use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, ListResponse, found, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::rbac::{CRM, require_role};
use crate::repo::companies::{self, CompanyFilter, CompanyInput, CompanyRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/companies", get(list_companies).post(create_company))
        .route(
            "/api/companies/{id}",
            get(get_company).put(update_company).delete(delete_company),
        )
}

fn validate(body: &CompanyInput, creating: bool) -> Result<(), ApiError> {
    let mut checks = Checks::new();
    if creating {
        checks.required("name", body.name.as_deref());
    }
    checks
        .opt(body.name.as_deref(), |v| validation::check_name("name", v))
        .opt(body.email.as_deref(), validation::check_email)
        .opt(body.phone.as_deref(), validation::check_phone)
        .opt(body.website.as_deref(), validation::check_url)
        .opt(body.notes.as_deref(), |v| {
            validation::check_length("notes", v, 0, 10_000)
        })
        .finish()
}

async fn list_companies(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<CompanyFilter>,
) -> Result<Json<ListResponse<CompanyRow>>, ApiError> {
    require_role(&auth, CRM)?;
    Ok(Json(companies::list(&state.pool, &filter).await?.into()))
}

async fn get_company(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CompanyRow>, ApiError> {
    require_role(&auth, CRM)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<CompanyRow, ApiError> {
    companies::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("company".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_company(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(mut body): ApiJson<CompanyInput>,
) -> Result<(StatusCode, Json<CompanyRow>), ApiError> {
    require_role(&auth, CRM)?;
    validate(&body, true)?;
    body.owner_id = body.owner_id.or(Some(auth.user_id));

    let id = companies::create(&state.pool, &body).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "company.create", "company", Some(id))
            .detail(serde_json::json!({"name": body.name})),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_company(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<CompanyInput>,
) -> Result<Json<CompanyRow>, ApiError> {
    require_role(&auth, CRM)?;
    validate(&body, false)?;
    found(companies::update(&state.pool, id, &body).await?, "company")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "company.update", "company", Some(id))
            .detail(serde_json::json!({"name": body.name})),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state), err)]
async fn delete_company(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, CRM)?;
    found(companies::delete(&state.pool, id).await?, "company")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "company.delete", "company", Some(id)),
    )
    .await;
    Ok(ok())
}
