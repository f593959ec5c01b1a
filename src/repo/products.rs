use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::Page;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub lender_id: Uuid,
    pub lender_name: String,
    pub name: String,
    pub category: Option<String>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub min_rate_bps: Option<i32>,
    pub max_rate_bps: Option<i32>,
    pub min_term_months: Option<i32>,
    pub max_term_months: Option<i32>,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductInput {
    pub lender_id: Option<Uuid>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub min_rate_bps: Option<i32>,
    pub max_rate_bps: Option<i32>,
    pub min_term_months: Option<i32>,
    pub max_term_months: Option<i32>,
    pub is_active: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub lender_id: Option<Uuid>,
    pub category: Option<String>,
    pub active: Option<bool>,
    /// Only products whose amount range covers this amount.
    pub amount: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const SELECT: &str = r"
    SELECT p.id, p.lender_id, l.name AS lender_name, p.name, p.category, p.min_amount,
           p.max_amount, p.min_rate_bps, p.max_rate_bps, p.min_term_months, p.max_term_months,
           p.is_active, p.description, p.created_at, p.updated_at
    FROM products p
    JOIN lenders l ON l.id = p.lender_id
";

const FILTER: &str = r"
    ($1::uuid IS NULL OR p.lender_id = $1)
    AND ($2::text IS NULL OR p.category = $2)
    AND ($3::bool IS NULL OR p.is_active = $3)
    AND ($4::bigint IS NULL OR (
        (p.min_amount IS NULL OR p.min_amount <= $4)
        AND (p.max_amount IS NULL OR p.max_amount >= $4)
    ))
";

pub async fn list(
    pool: &PgPool,
    filter: &ProductFilter,
) -> Result<(Vec<ProductRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products p WHERE {FILTER}"))
            .bind(filter.lender_id)
            .bind(&filter.category)
            .bind(filter.active)
            .bind(filter.amount)
            .fetch_one(pool)
            .await?;

    let items = sqlx::query_as::<_, ProductRow>(&format!(
        "{SELECT} WHERE {FILTER} ORDER BY l.name, p.name LIMIT $5 OFFSET $6"
    ))
    .bind(filter.lender_id)
    .bind(&filter.category)
    .bind(filter.active)
    .bind(filter.amount)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<ProductRow>, sqlx::Error> {
    sqlx::query_as::<_, ProductRow>(&format!("{SELECT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &PgPool, input: &ProductInput) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO products (lender_id, name, category, min_amount, max_amount, min_rate_bps,
                              max_rate_bps, min_term_months, max_term_months, is_active,
                              description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, true), $11)
        RETURNING id
        ",
    )
    .bind(input.lender_id)
    .bind(&input.name)
    .bind(&input.category)
    .bind(input.min_amount)
    .bind(input.max_amount)
    .bind(input.min_rate_bps)
    .bind(input.max_rate_bps)
    .bind(input.min_term_months)
    .bind(input.max_term_months)
    .bind(input.is_active)
    .bind(&input.description)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, input: &ProductInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE products SET
            lender_id = COALESCE($2, lender_id),
            name = COALESCE($3, name),
            category = COALESCE($4, category),
            min_amount = COALESCE($5, min_amount),
            max_amount = COALESCE($6, max_amount),
            min_rate_bps = COALESCE($7, min_rate_bps),
            max_rate_bps = COALESCE($8, max_rate_bps),
            min_term_months = COALESCE($9, min_term_months),
            max_term_months = COALESCE($10, max_term_months),
            is_active = COALESCE($11, is_active),
            description = COALESCE($12, description)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(input.lender_id)
    .bind(&input.name)
    .bind(&input.category)
    .bind(input.min_amount)
    .bind(input.max_amount)
    .bind(input.min_rate_bps)
    .bind(input.max_rate_bps)
    .bind(input.min_term_months)
    .bind(input.max_term_months)
    .bind(input.is_active)
    .bind(&input.description)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
