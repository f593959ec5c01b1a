use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Entity kinds a tag can be attached to; mirrors the `entity_tags` check.
pub const ENTITY_TYPES: &[&str] = &["contact", "company", "application", "deal"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TagRow {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagInput {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagTarget {
    pub entity_type: String,
    pub entity_id: Uuid,
}

const SELECT: &str = r"
    SELECT t.id, t.name, t.color,
           (SELECT COUNT(*) FROM entity_tags et WHERE et.tag_id = t.id) AS usage_count,
           t.created_at
    FROM tags t
";

pub async fn list(pool: &PgPool) -> Result<Vec<TagRow>, sqlx::Error> {
    sqlx::query_as::<_, TagRow>(&format!("{SELECT} ORDER BY t.name"))
        .fetch_all(pool)
        .await
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<TagRow>, sqlx::Error> {
    sqlx::query_as::<_, TagRow>(&format!("{SELECT} WHERE t.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &PgPool, input: &TagInput) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO tags (name, color) VALUES ($1, COALESCE($2, '#64748b')) RETURNING id",
    )
    .bind(&input.name)
    .bind(&input.color)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, input: &TagInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE tags SET name = COALESCE($2, name), color = COALESCE($3, color) WHERE id = $1",
    )
    .bind(id)
    .bind(&input.name)
    .bind(&input.color)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Assignments are removed by the `ON DELETE CASCADE` on `entity_tags`.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tags WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Whether the tagged entity exists; `entity_tags` has no foreign key to it.
pub async fn entity_exists(pool: &PgPool, target: &TagTarget) -> Result<bool, sqlx::Error> {
    let table = match target.entity_type.as_str() {
        "contact" => "contacts",
        "company" => "companies",
        "application" => "applications",
        "deal" => "deals",
        _ => return Ok(false),
    };
    sqlx::query_scalar(&format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"))
        .bind(target.entity_id)
        .fetch_one(pool)
        .await
}

/// Attach a tag. Re-assigning an existing pair is a no-op; returns whether a
/// row was inserted.
pub async fn assign(pool: &PgPool, tag_id: Uuid, target: &TagTarget) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        INSERT INTO entity_tags (tag_id, entity_type, entity_id)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(tag_id)
    .bind(&target.entity_type)
    .bind(target.entity_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn unassign(
    pool: &PgPool,
    tag_id: Uuid,
    target: &TagTarget,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM entity_tags WHERE tag_id = $1 AND entity_type = $2 AND entity_id = $3",
    )
    .bind(tag_id)
    .bind(&target.entity_type)
    .bind(target.entity_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
