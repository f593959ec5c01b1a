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
use crate::repo::contacts::{self, ContactFilter, ContactInput, ContactRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/contacts", get(list_contacts).post(create_contact))
        .route(
            "/api/contacts/{id}",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
}

fn validate(body: &ContactInput, creating: bool) -> Result<(), ApiError> {
    let mut checks = Checks::new();
    if creating {
        checks.required("first_name", body.first_name.as_deref());
    }
    checks
        .opt(body.first_name.as_deref(), |v| {
            validation::check_name("first_name", v)
        })
        .opt(body.last_name.as_deref(), |v| {
            validation::check_length("last_name", v, 0, 255)
        })
        .opt(body.email.as_deref(), validation::check_email)
        .opt(body.phone.as_deref(), validation::check_phone)
        .opt(body.title.as_deref(), |v| validation::check_length("title", v, 0, 255))
        .finish()
}

async fn list_contacts(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<ContactFilter>,
) -> Result<Json<ListResponse<ContactRow>>, ApiError> {
    require_role(&auth, CRM)?;
    Ok(Json(contacts::list(&state.pool, &filter).await?.into()))
}

async fn get_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ContactRow>, ApiError> {
    require_role(&auth, CRM)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<ContactRow, ApiError> {
    contacts::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("contact".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(mut body): ApiJson<ContactInput>,
) -> Result<(StatusCode, Json<ContactRow>), ApiError> {
    require_role(&auth, CRM)?;
    validate(&body, true)?;
    body.owner_id = body.owner_id.or(Some(auth.user_id));

    let id = contacts::create(&state.pool, &body).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "contact.create", "contact", Some(id)).detail(
            serde_json::json!({"first_name": body.first_name, "last_name": body.last_name}),
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ContactInput>,
) -> Result<Json<ContactRow>, ApiError> {
    require_role(&auth, CRM)?;
    validate(&body, false)?;
    found(contacts::update(&state.pool, id, &body).await?, "contact")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "contact.update", "contact", Some(id))
            .detail(serde_json::json!({"company_id": body.company_id})),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state), err)]
async fn delete_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, CRM)?;
    found(contacts::delete(&state.pool, id).await?, "contact")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "contact.delete", "contact", Some(id)),
    )
    .await;
    Ok(ok())
}
