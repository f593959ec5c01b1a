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
use crate::repo::products::{self, ProductFilter, ProductInput, ProductRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route(
            "/api/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

/// Requested bound, falling back to the stored one on partial updates.
fn merged<T: Copy>(
    new: Option<T>,
    current: Option<&ProductRow>,
    pick: fn(&ProductRow) -> Option<T>,
) -> Option<T> {
    new.or_else(|| current.and_then(pick))
}

fn validate(body: &ProductInput, current: Option<&ProductRow>) -> Result<(), ApiError> {
    let mut checks = Checks::new();
    if current.is_none() {
        checks
            .required("lender_id", body.lender_id.as_ref())
            .required("name", body.name.as_deref());
    }

    let amount = (
        merged(body.min_amount, current, |p| p.min_amount),
        merged(body.max_amount, current, |p| p.max_amount),
    );
    let rate = (
        merged(body.min_rate_bps, current, |p| p.min_rate_bps),
        merged(body.max_rate_bps, current, |p| p.max_rate_bps),
    );
    let term = (
        merged(body.min_term_months, current, |p| p.min_term_months),
        merged(body.max_term_months, current, |p| p.max_term_months),
    );

    for (field, value) in [
        ("min_amount", body.min_amount),
        ("max_amount", body.max_amount),
        ("min_rate_bps", body.min_rate_bps.map(i64::from)),
        ("max_rate_bps", body.max_rate_bps.map(i64::from)),
        ("min_term_months", body.min_term_months.map(i64::from)),
        ("max_term_months", body.max_term_months.map(i64::from)),
    ] {
        checks.opt(value, |v| validation::check_non_negative(field, v));
    }

    checks
        .opt(body.name.as_deref(), |v| validation::check_name("name", v))
        .add(validation::check_range("amount", amount.0, amount.1))
        .add(validation::check_range("rate_bps", rate.0, rate.1))
        .add(validation::check_range("term_months", term.0, term.1))
        .finish()
}

async fn list_products(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<ProductFilter>,
) -> Result<Json<ListResponse<ProductRow>>, ApiError> {
    require_role(&auth, PORTAL)?;
    Ok(Json(products::list(&state.pool, &filter).await?.into()))
}

async fn get_product(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ProductRow>, ApiError> {
    require_role(&auth, PORTAL)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<ProductRow, ApiError> {
    products::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("product".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_product(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ProductInput>,
) -> Result<(StatusCode, Json<ProductRow>), ApiError> {
    require_role(&auth, STAFF)?;
    validate(&body, None)?;

    let id = products::create(&state.pool, &body).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "product.create", "product", Some(id))
            .detail(serde_json::json!({"name": body.name, "lender_id": body.lender_id})),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_product(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ProductInput>,
) -> Result<Json<ProductRow>, ApiError> {
    require_role(&auth, STAFF)?;
    let current = fetch(&state, id).await?;
    validate(&body, Some(&current))?;
    found(products::update(&state.pool, id, &body).await?, "product")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "product.update", "product", Some(id)).detail(serde_json::json!({
            "name": body.name,
            "is_active": body.is_active,
        })),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state), err)]
async fn delete_product(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, MANAGEMENT)?;
    found(products::delete(&state.pool, id).await?, "product")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "product.delete", "product", Some(id)),
    )
    .await;
    Ok(ok())
}
