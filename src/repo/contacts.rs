use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::{Page, like_pattern};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContactRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub company_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactFilter {
    pub q: Option<String>,
    pub company_id: Option<Uuid>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const SELECT: &str = r"
    SELECT ct.id, ct.first_name, ct.last_name, ct.email, ct.phone, ct.title,
           ct.company_id, co.name AS company_name, ct.owner_id, ct.notes,
           ARRAY(
               SELECT t.name FROM entity_tags et JOIN tags t ON t.id = et.tag_id
               WHERE et.entity_type = 'contact' AND et.entity_id = ct.id
               ORDER BY t.name
           ) AS tags,
           ct.created_at, ct.updated_at
    FROM contacts ct
    LEFT JOIN companies co ON co.id = ct.company_id
";

const FILTER: &str = r"
    ($1::text IS NULL
        OR ct.first_name ILIKE $1 OR ct.last_name ILIKE $1
        OR (ct.first_name || ' ' || ct.last_name) ILIKE $1
        OR ct.email ILIKE $1 OR ct.phone ILIKE $1)
    AND ($2::uuid IS NULL OR ct.company_id = $2)
    AND ($3::text IS NULL OR EXISTS (
        SELECT 1 FROM entity_tags et JOIN tags t ON t.id = et.tag_id
        WHERE et.entity_type = 'contact' AND et.entity_id = ct.id AND t.name = $3
    ))
";

pub async fn list(
    pool: &PgPool,
    filter: &ContactFilter,
) -> Result<(Vec<ContactRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);
    let pattern = like_pattern(filter.q.as_deref());

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM contacts ct WHERE {FILTER}"))
            .bind(&pattern)
            .bind(filter.company_id)
            .bind(&filter.tag)
            .fetch_one(pool)
            .await?;

    let items = sqlx::query_as::<_, ContactRow>(&format!(
        "{SELECT} WHERE {FILTER} ORDER BY ct.last_name, ct.first_name LIMIT $4 OFFSET $5"
    ))
    .bind(&pattern)
    .bind(filter.company_id)
    .bind(&filter.tag)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<ContactRow>, sqlx::Error> {
    sqlx::query_as::<_, ContactRow>(&format!("{SELECT} WHERE ct.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &PgPool, input: &ContactInput) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO contacts (first_name, last_name, email, phone, title, company_id, owner_id, notes)
        VALUES ($1, COALESCE($2, ''), $3, $4, $5, $6, $7, $8)
        RETURNING id
        ",
    )
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.email)
    .bind(&input.phone)
    .bind(&input.title)
    .bind(input.company_id)
    .bind(input.owner_id)
    .bind(&input.notes)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, input: &ContactInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE contacts SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            email = COALESCE($4, email),
            phone = COALESCE($5, phone),
            title = COALESCE($6, title),
            company_id = COALESCE($7, company_id),
            owner_id = COALESCE($8, owner_id),
            notes = COALESCE($9, notes)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.email)
    .bind(&input.phone)
    .bind(&input.title)
    .bind(input.company_id)
    .bind(input.owner_id)
    .bind(&input.notes)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM entity_tags WHERE entity_type = 'contact' AND entity_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Phone number on file for a contact, used when queueing SMS.
pub async fn phone(pool: &PgPool, id: Uuid) -> Result<Option<String>, sqlx::Error> {
    let phone: Option<Option<String>> =
        sqlx::query_scalar("SELECT phone FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(phone.flatten())
}

/// Email address on file for a contact, used when queueing email.
pub async fn email(pool: &PgPool, id: Uuid) -> Result<Option<String>, sqlx::Error> {
    let email: Option<Option<String>> =
        sqlx::query_scalar("SELECT email FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(email.flatten())
}
