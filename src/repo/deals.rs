use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::Page;

pub const STATUSES: &[&str] = &["open", "won", "lost"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DealRow {
    pub id: Uuid,
    pub title: String,
    pub application_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub contact_id: Option<Uuid>,
    pub lender_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub amount: i64,
    pub status: String,
    pub expected_close_date: Option<NaiveDate>,
    pub closed_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DealInput {
    pub title: Option<String>,
    pub application_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub lender_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub status: Option<String>,
    pub expected_close_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DealFilter {
    pub status: Option<String>,
    pub owner_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const SELECT: &str = r"
    SELECT d.id, d.title, d.application_id, d.company_id, co.name AS company_name,
           d.contact_id, d.lender_id, d.owner_id, d.amount, d.status,
           d.expected_close_date, d.closed_at,
           ARRAY(
               SELECT t.name FROM entity_tags et JOIN tags t ON t.id = et.tag_id
               WHERE et.entity_type = 'deal' AND et.entity_id = d.id
               ORDER BY t.name
           ) AS tags,
           d.created_at, d.updated_at
    FROM deals d
    LEFT JOIN companies co ON co.id = d.company_id
";

const FILTER: &str = r"
    ($1::text IS NULL OR d.status = $1)
    AND ($2::uuid IS NULL OR d.owner_id = $2)
    AND ($3::uuid IS NULL OR d.company_id = $3)
";

pub async fn list(pool: &PgPool, filter: &DealFilter) -> Result<(Vec<DealRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM deals d WHERE {FILTER}"))
        .bind(&filter.status)
        .bind(filter.owner_id)
        .bind(filter.company_id)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, DealRow>(&format!(
        "{SELECT} WHERE {FILTER} ORDER BY d.updated_at DESC LIMIT $4 OFFSET $5"
    ))
    .bind(&filter.status)
    .bind(filter.owner_id)
    .bind(filter.company_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<DealRow>, sqlx::Error> {
    sqlx::query_as::<_, DealRow>(&format!("{SELECT} WHERE d.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &PgPool, input: &DealInput) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO deals (title, application_id, company_id, contact_id, lender_id, owner_id,
                           amount, status, expected_close_date, closed_at)
        VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 0), COALESCE($8, 'open'), $9,
                CASE WHEN $8 IN ('won', 'lost') THEN now() END)
        RETURNING id
        ",
    )
    .bind(&input.title)
    .bind(input.application_id)
    .bind(input.company_id)
    .bind(input.contact_id)
    .bind(input.lender_id)
    .bind(input.owner_id)
    .bind(input.amount)
    .bind(&input.status)
    .bind(input.expected_close_date)
    .fetch_one(pool)
    .await
}

/// Partial update. A status change to `won`/`lost` stamps `closed_at`; a
/// change back to `open` clears it.
pub async fn update(pool: &PgPool, id: Uuid, input: &DealInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE deals SET
            title = COALESCE($2, title),
            application_id = COALESCE($3, application_id),
            company_id = COALESCE($4, company_id),
            contact_id = COALESCE($5, contact_id),
            lender_id = COALESCE($6, lender_id),
            owner_id = COALESCE($7, owner_id),
            amount = COALESCE($8, amount),
            expected_close_date = COALESCE($10, expected_close_date),
            closed_at = CASE
                WHEN $9 = 'open' THEN NULL
                WHEN $9 IN ('won', 'lost') AND status <> $9 THEN now()
                ELSE closed_at
            END,
            status = COALESCE($9, status)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(&input.title)
    .bind(input.application_id)
    .bind(input.company_id)
    .bind(input.contact_id)
    .bind(input.lender_id)
    .bind(input.owner_id)
    .bind(input.amount)
    .bind(&input.status)
    .bind(input.expected_close_date)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM entity_tags WHERE entity_type = 'deal' AND entity_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM deals WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}
