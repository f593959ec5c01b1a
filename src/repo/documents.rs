use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::Page;

pub const STATUSES: &[&str] = &["pending", "approved", "rejected"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub storage_key: Option<String>,
    pub doc_type: Option<String>,
    pub status: String,
    pub ocr_text: Option<String>,
    pub ocr_confidence: Option<f32>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentInput {
    pub application_id: Option<Uuid>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub storage_key: Option<String>,
    pub doc_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentFilter {
    pub application_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const COLUMNS: &str = r"
    id, application_id, uploaded_by, file_name, mime_type, size_bytes, storage_key, doc_type,
    status, ocr_text, ocr_confidence, reviewed_by, reviewed_at, review_notes, created_at, updated_at
";

const FILTER: &str = r"
    ($1::uuid IS NULL OR application_id = $1)
    AND ($2::text IS NULL OR status = $2)
";

pub async fn list(
    pool: &PgPool,
    filter: &DocumentFilter,
) -> Result<(Vec<DocumentRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM documents WHERE {FILTER}"))
        .bind(filter.application_id)
        .bind(&filter.status)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {COLUMNS} FROM documents WHERE {FILTER} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(filter.application_id)
    .bind(&filter.status)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(&format!("SELECT {COLUMNS} FROM documents WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Register document metadata; the file itself lives in external storage.
pub async fn create(
    pool: &PgPool,
    input: &DocumentInput,
    uploaded_by: Uuid,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO documents (application_id, uploaded_by, file_name, mime_type, size_bytes,
                               storage_key, doc_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        ",
    )
    .bind(input.application_id)
    .bind(uploaded_by)
    .bind(&input.file_name)
    .bind(&input.mime_type)
    .bind(input.size_bytes)
    .bind(&input.storage_key)
    .bind(&input.doc_type)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, input: &DocumentInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE documents SET
            file_name = COALESCE($2, file_name),
            mime_type = COALESCE($3, mime_type),
            size_bytes = COALESCE($4, size_bytes),
            storage_key = COALESCE($5, storage_key),
            doc_type = COALESCE($6, doc_type)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(&input.file_name)
    .bind(&input.mime_type)
    .bind(input.size_bytes)
    .bind(&input.storage_key)
    .bind(&input.doc_type)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record a review decision and who made it.
pub async fn review(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    notes: Option<&str>,
    reviewer: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE documents SET
            status = $2,
            review_notes = $3,
            reviewed_by = $4,
            reviewed_at = now()
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(status)
    .bind(notes)
    .bind(reviewer)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Store OCR output posted by the external extraction process.
pub async fn set_ocr(
    pool: &PgPool,
    id: Uuid,
    text: &str,
    confidence: Option<f32>,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE documents SET ocr_text = $2, ocr_confidence = $3 WHERE id = $1")
            .bind(id)
            .bind(text)
            .bind(confidence)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
