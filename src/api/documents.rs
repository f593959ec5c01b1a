use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::helpers::{ApiJson, ApiPath, ApiQuery, ListResponse, found, ok};
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::notify::dispatch;
use crate::rbac::{PORTAL, STAFF, require_role};
use crate::repo::documents::{self, DocumentFilter, DocumentInput, DocumentRow};
use crate::store::AppState;
use crate::validation::{self, Checks};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OcrRequest {
    pub text: String,
    pub confidence: Option<f32>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/documents", get(list_documents).post(create_document))
        .route(
            "/api/documents/{id}",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/api/documents/{id}/review", put(review_document))
        .route("/api/documents/{id}/ocr", put(store_ocr))
}

fn validate(body: &DocumentInput, creating: bool) -> Result<(), ApiError> {
    let mut checks = Checks::new();
    if creating {
        checks
            .required("application_id", body.application_id.as_ref())
            .required("file_name", body.file_name.as_deref());
    }
    checks
        .opt(body.file_name.as_deref(), |v| {
            validation::check_length("file_name", v, 1, 255)
        })
        .opt(body.size_bytes, |v| validation::check_non_negative("size_bytes", v))
        .finish()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_documents(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<DocumentFilter>,
) -> Result<Json<ListResponse<DocumentRow>>, ApiError> {
    require_role(&auth, PORTAL)?;
    Ok(Json(documents::list(&state.pool, &filter).await?.into()))
}

async fn get_document(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DocumentRow>, ApiError> {
    require_role(&auth, PORTAL)?;
    fetch(&state, id).await.map(Json)
}

async fn fetch(state: &AppState, id: Uuid) -> Result<DocumentRow, ApiError> {
    documents::get(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("document".into()))
}

#[tracing::instrument(skip(state, body), err)]
async fn create_document(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<DocumentInput>,
) -> Result<(StatusCode, Json<DocumentRow>), ApiError> {
    require_role(&auth, STAFF)?;
    validate(&body, true)?;

    let id = documents::create(&state.pool, &body, auth.user_id).await?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "document.create", "document", Some(id)).detail(
            serde_json::json!({
                "application_id": body.application_id,
                "file_name": body.file_name,
            }),
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch(&state, id).await?)))
}

#[tracing::instrument(skip(state, body), err)]
async fn update_document(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<DocumentInput>,
) -> Result<Json<DocumentRow>, ApiError> {
    require_role(&auth, STAFF)?;
    validate(&body, false)?;
    found(documents::update(&state.pool, id, &body).await?, "document")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "document.update", "document", Some(id))
            .detail(serde_json::json!({"file_name": body.file_name, "doc_type": body.doc_type})),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state, body), err)]
async fn review_document(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ReviewRequest>,
) -> Result<Json<DocumentRow>, ApiError> {
    require_role(&auth, STAFF)?;
    Checks::new()
        .add(validation::check_one_of(
            "status",
            &body.status,
            documents::STATUSES,
        ))
        .opt(body.notes.as_deref(), |v| {
            validation::check_length("notes", v, 0, 5000)
        })
        .finish()?;

    found(
        documents::review(&state.pool, id, &body.status, body.notes.as_deref(), auth.user_id)
            .await?,
        "document",
    )?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "document.review", "document", Some(id))
            .detail(serde_json::json!({"status": body.status})),
    )
    .await;

    let doc = fetch(&state, id).await?;
    if let Some(uploader) = doc.uploaded_by
        && uploader != auth.user_id
    {
        dispatch::on_document_reviewed(&state, uploader, id, &body.status).await;
    }
    Ok(Json(doc))
}

/// OCR results come from an external extraction process.
#[tracing::instrument(skip(state, body), err)]
async fn store_ocr(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<OcrRequest>,
) -> Result<Json<DocumentRow>, ApiError> {
    require_role(&auth, STAFF)?;
    if let Some(c) = body.confidence
        && !(0.0..=1.0).contains(&c)
    {
        return Err(ApiError::Validation(vec![
            "confidence must be between 0 and 1".into(),
        ]));
    }

    found(
        documents::set_ocr(&state.pool, id, &body.text, body.confidence).await?,
        "document",
    )?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "document.ocr", "document", Some(id)).detail(serde_json::json!({
            "chars": body.text.chars().count(),
            "confidence": body.confidence,
        })),
    )
    .await;

    Ok(Json(fetch(&state, id).await?))
}

#[tracing::instrument(skip(state), err)]
async fn delete_document(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&auth, STAFF)?;
    found(documents::delete(&state.pool, id).await?, "document")?;

    write_audit(
        &state.pool,
        &AuditEntry::by(&auth, "document.delete", "document", Some(id)),
    )
    .await;
    Ok(ok())
}
