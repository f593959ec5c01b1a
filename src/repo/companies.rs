use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::{Page, like_pattern};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CompanyRow {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
    pub owner_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub contact_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyInput {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyFilter {
    pub q: Option<String>,
    pub tag: Option<String>,
    pub owner_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const SELECT: &str = r"
    SELECT c.id, c.name, c.industry, c.website, c.phone, c.email, c.address, c.city,
           c.state, c.postal_code, c.notes, c.owner_id,
           ARRAY(
               SELECT t.name FROM entity_tags et JOIN tags t ON t.id = et.tag_id
               WHERE et.entity_type = 'company' AND et.entity_id = c.id
               ORDER BY t.name
           ) AS tags,
           (SELECT COUNT(*) FROM contacts ct WHERE ct.company_id = c.id) AS contact_count,
           c.created_at, c.updated_at
    FROM companies c
";

const FILTER: &str = r"
    ($1::text IS NULL OR c.name ILIKE $1 OR c.email ILIKE $1 OR c.industry ILIKE $1)
    AND ($2::text IS NULL OR EXISTS (
        SELECT 1 FROM entity_tags et JOIN tags t ON t.id = et.tag_id
        WHERE et.entity_type = 'company' AND et.entity_id = c.id AND t.name = $2
    ))
    AND ($3::uuid IS NULL OR c.owner_id = $3)
";

pub async fn list(
    pool: &PgPool,
    filter: &CompanyFilter,
) -> Result<(Vec<CompanyRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);
    let pattern = like_pattern(filter.q.as_deref());

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM companies c WHERE {FILTER}"))
            .bind(&pattern)
            .bind(&filter.tag)
            .bind(filter.owner_id)
            .fetch_one(pool)
            .await?;

    let items = sqlx::query_as::<_, CompanyRow>(&format!(
        "{SELECT} WHERE {FILTER} ORDER BY c.name LIMIT $4 OFFSET $5"
    ))
    .bind(&pattern)
    .bind(&filter.tag)
    .bind(filter.owner_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<CompanyRow>, sqlx::Error> {
    sqlx::query_as::<_, CompanyRow>(&format!("{SELECT} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Insert a company; `input.name` must already be validated as present.
pub async fn create(pool: &PgPool, input: &CompanyInput) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO companies (name, industry, website, phone, email, address, city, state,
                               postal_code, notes, owner_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        ",
    )
    .bind(&input.name)
    .bind(&input.industry)
    .bind(&input.website)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(&input.address)
    .bind(&input.city)
    .bind(&input.state)
    .bind(&input.postal_code)
    .bind(&input.notes)
    .bind(input.owner_id)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, input: &CompanyInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE companies SET
            name = COALESCE($2, name),
            industry = COALESCE($3, industry),
            website = COALESCE($4, website),
            phone = COALESCE($5, phone),
            email = COALESCE($6, email),
            address = COALESCE($7, address),
            city = COALESCE($8, city),
            state = COALESCE($9, state),
            postal_code = COALESCE($10, postal_code),
            notes = COALESCE($11, notes),
            owner_id = COALESCE($12, owner_id)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(&input.name)
    .bind(&input.industry)
    .bind(&input.website)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(&input.address)
    .bind(&input.city)
    .bind(&input.state)
    .bind(&input.postal_code)
    .bind(&input.notes)
    .bind(input.owner_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM entity_tags WHERE entity_type = 'company' AND entity_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM companies WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}
