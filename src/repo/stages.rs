use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StageRow {
    pub id: Uuid,
    pub name: String,
    pub position: i32,
    pub color: String,
    pub is_terminal: bool,
    pub application_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StageInput {
    pub name: Option<String>,
    pub color: Option<String>,
    pub is_terminal: Option<bool>,
    pub position: Option<i32>,
}

const SELECT: &str = r"
    SELECT s.id, s.name, s.position, s.color, s.is_terminal,
           (SELECT COUNT(*) FROM applications a WHERE a.stage_id = s.id) AS application_count,
           s.created_at, s.updated_at
    FROM pipeline_stages s
";

pub async fn list(pool: &PgPool) -> Result<Vec<StageRow>, sqlx::Error> {
    sqlx::query_as::<_, StageRow>(&format!("{SELECT} ORDER BY s.position, s.name"))
        .fetch_all(pool)
        .await
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<StageRow>, sqlx::Error> {
    sqlx::query_as::<_, StageRow>(&format!("{SELECT} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// First stage by position; new applications land here by default.
pub async fn first(pool: &PgPool) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM pipeline_stages ORDER BY position, name LIMIT 1")
        .fetch_optional(pool)
        .await
}

/// Insert a stage; without an explicit position it goes after the last one.
pub async fn create(pool: &PgPool, input: &StageInput) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO pipeline_stages (name, position, color, is_terminal)
        VALUES (
            $1,
            COALESCE($2, (SELECT COALESCE(MAX(position) + 1, 0) FROM pipeline_stages)),
            COALESCE($3, '#64748b'),
            COALESCE($4, false)
        )
        RETURNING id
        ",
    )
    .bind(&input.name)
    .bind(input.position)
    .bind(&input.color)
    .bind(input.is_terminal)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, input: &StageInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE pipeline_stages SET
            name = COALESCE($2, name),
            position = COALESCE($3, position),
            color = COALESCE($4, color),
            is_terminal = COALESCE($5, is_terminal)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(&input.name)
    .bind(input.position)
    .bind(&input.color)
    .bind(input.is_terminal)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Rewrite positions to match the order of `stage_ids`. Returns the number of
/// stages updated; ids that do not exist are skipped.
pub async fn reorder(pool: &PgPool, stage_ids: &[Uuid]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for (position, id) in (0i32..).zip(stage_ids) {
        updated += sqlx::query("UPDATE pipeline_stages SET position = $2 WHERE id = $1")
            .bind(id)
            .bind(position)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}

/// Fails with a foreign-key violation while applications still use the stage.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pipeline_stages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
