use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::repo::Page;

pub const STATUSES: &[&str] = &[
    "draft",
    "submitted",
    "in_review",
    "approved",
    "declined",
    "funded",
    "withdrawn",
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub contact_id: Option<Uuid>,
    pub contact_name: Option<String>,
    pub product_id: Option<Uuid>,
    pub lender_id: Option<Uuid>,
    pub lender_name: Option<String>,
    pub stage_id: Uuid,
    pub stage_name: String,
    pub assigned_to: Option<Uuid>,
    pub amount_requested: i64,
    pub purpose: Option<String>,
    pub status: String,
    pub position: i32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationInput {
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub lender_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub amount_requested: Option<i64>,
    pub purpose: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationFilter {
    pub stage_id: Option<Uuid>,
    pub status: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub lender_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub const SELECT: &str = r"
    SELECT a.id, a.company_id, co.name AS company_name, a.contact_id,
           NULLIF(TRIM(ct.first_name || ' ' || ct.last_name), '') AS contact_name,
           a.product_id, a.lender_id, l.name AS lender_name, a.stage_id, s.name AS stage_name,
           a.assigned_to, a.amount_requested, a.purpose, a.status, a.position,
           a.submitted_at, a.created_by, a.created_at, a.updated_at
    FROM applications a
    JOIN pipeline_stages s ON s.id = a.stage_id
    LEFT JOIN companies co ON co.id = a.company_id
    LEFT JOIN contacts ct ON ct.id = a.contact_id
    LEFT JOIN lenders l ON l.id = a.lender_id
";

const FILTER: &str = r"
    ($1::uuid IS NULL OR a.stage_id = $1)
    AND ($2::text IS NULL OR a.status = $2)
    AND ($3::uuid IS NULL OR a.assigned_to = $3)
    AND ($4::uuid IS NULL OR a.company_id = $4)
    AND ($5::uuid IS NULL OR a.lender_id = $5)
";

pub async fn list(
    pool: &PgPool,
    filter: &ApplicationFilter,
) -> Result<(Vec<ApplicationRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM applications a WHERE {FILTER}"))
            .bind(filter.stage_id)
            .bind(&filter.status)
            .bind(filter.assigned_to)
            .bind(filter.company_id)
            .bind(filter.lender_id)
            .fetch_one(pool)
            .await?;

    let items = sqlx::query_as::<_, ApplicationRow>(&format!(
        "{SELECT} WHERE {FILTER} ORDER BY a.updated_at DESC LIMIT $6 OFFSET $7"
    ))
    .bind(filter.stage_id)
    .bind(&filter.status)
    .bind(filter.assigned_to)
    .bind(filter.company_id)
    .bind(filter.lender_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(&format!("{SELECT} WHERE a.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Insert at the end of the stage's column.
pub async fn create(
    pool: &PgPool,
    input: &ApplicationInput,
    stage_id: Uuid,
    created_by: Uuid,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO applications (company_id, contact_id, product_id, lender_id, stage_id,
                                  assigned_to, amount_requested, purpose, status, position,
                                  submitted_at, created_by)
        VALUES (
            $1, $2, $3, $4, $5, $6, COALESCE($7, 0), $8, COALESCE($9, 'draft'),
            (SELECT COALESCE(MAX(position) + 1, 0) FROM applications WHERE stage_id = $5),
            CASE WHEN $9 = 'submitted' THEN now() END,
            $10
        )
        RETURNING id
        ",
    )
    .bind(input.company_id)
    .bind(input.contact_id)
    .bind(input.product_id)
    .bind(input.lender_id)
    .bind(stage_id)
    .bind(input.assigned_to)
    .bind(input.amount_requested)
    .bind(&input.purpose)
    .bind(&input.status)
    .bind(created_by)
    .fetch_one(pool)
    .await
}

/// Partial update. Stage changes go through `pipeline::move_within` so
/// column positions stay dense; `stage_id` is ignored here. Runs on the
/// caller's connection so it can share a transaction with the move.
pub async fn update(
    conn: &mut PgConnection,
    id: Uuid,
    input: &ApplicationInput,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE applications SET
            company_id = COALESCE($2, company_id),
            contact_id = COALESCE($3, contact_id),
            product_id = COALESCE($4, product_id),
            lender_id = COALESCE($5, lender_id),
            assigned_to = COALESCE($6, assigned_to),
            amount_requested = COALESCE($7, amount_requested),
            purpose = COALESCE($8, purpose),
            status = COALESCE($9, status),
            submitted_at = CASE
                WHEN $9 = 'submitted' AND submitted_at IS NULL THEN now()
                ELSE submitted_at
            END
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(input.company_id)
    .bind(input.contact_id)
    .bind(input.product_id)
    .bind(input.lender_id)
    .bind(input.assigned_to)
    .bind(input.amount_requested)
    .bind(&input.purpose)
    .bind(&input.status)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete and close the gap left in the stage column.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let removed: Option<(Uuid, i32)> =
        sqlx::query_as("DELETE FROM applications WHERE id = $1 RETURNING stage_id, position")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

    let Some((stage_id, position)) = removed else {
        return Ok(false);
    };

    sqlx::query(
        "UPDATE applications SET position = position - 1 WHERE stage_id = $1 AND position > $2",
    )
    .bind(stage_id)
    .bind(position)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM entity_tags WHERE entity_type = 'application' AND entity_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}
