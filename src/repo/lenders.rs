use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::{Page, like_pattern};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LenderRow {
    pub id: Uuid,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub product_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LenderInput {
    pub name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LenderFilter {
    pub q: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const SELECT: &str = r"
    SELECT l.id, l.name, l.contact_name, l.email, l.phone, l.website, l.min_amount,
           l.max_amount, l.is_active, l.notes,
           (SELECT COUNT(*) FROM products p WHERE p.lender_id = l.id) AS product_count,
           l.created_at, l.updated_at
    FROM lenders l
";

const FILTER: &str = r"
    ($1::text IS NULL OR l.name ILIKE $1 OR l.contact_name ILIKE $1)
    AND ($2::bool IS NULL OR l.is_active = $2)
";

pub async fn list(
    pool: &PgPool,
    filter: &LenderFilter,
) -> Result<(Vec<LenderRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);
    let pattern = like_pattern(filter.q.as_deref());

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM lenders l WHERE {FILTER}"))
        .bind(&pattern)
        .bind(filter.active)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, LenderRow>(&format!(
        "{SELECT} WHERE {FILTER} ORDER BY l.name LIMIT $3 OFFSET $4"
    ))
    .bind(&pattern)
    .bind(filter.active)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<LenderRow>, sqlx::Error> {
    sqlx::query_as::<_, LenderRow>(&format!("{SELECT} WHERE l.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &PgPool, input: &LenderInput) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO lenders (name, contact_name, email, phone, website, min_amount, max_amount,
                             is_active, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, true), $9)
        RETURNING id
        ",
    )
    .bind(&input.name)
    .bind(&input.contact_name)
    .bind(&input.email)
    .bind(&input.phone)
    .bind(&input.website)
    .bind(input.min_amount)
    .bind(input.max_amount)
    .bind(input.is_active)
    .bind(&input.notes)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, input: &LenderInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE lenders SET
            name = COALESCE($2, name),
            contact_name = COALESCE($3, contact_name),
            email = COALESCE($4, email),
            phone = COALESCE($5, phone),
            website = COALESCE($6, website),
            min_amount = COALESCE($7, min_amount),
            max_amount = COALESCE($8, max_amount),
            is_active = COALESCE($9, is_active),
            notes = COALESCE($10, notes)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(&input.name)
    .bind(&input.contact_name)
    .bind(&input.email)
    .bind(&input.phone)
    .bind(&input.website)
    .bind(input.min_amount)
    .bind(input.max_amount)
    .bind(input.is_active)
    .bind(&input.notes)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM lenders WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
