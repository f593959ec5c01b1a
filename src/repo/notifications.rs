use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::Page;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub subject: String,
    pub body: Option<String>,
    pub status: String,
    pub ref_type: Option<String>,
    pub ref_id: Option<Uuid>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const COLUMNS: &str = r"
    id, user_id, notification_type, subject, body, status, ref_type, ref_id, read_at, created_at
";

const FILTER: &str = r"
    user_id = $1
    AND ($2::text IS NULL OR status = $2)
    AND ($3::text IS NULL OR notification_type = $3)
";

/// Notifications addressed to `user_id`, newest first.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    filter: &NotificationFilter,
) -> Result<(Vec<NotificationRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM notifications WHERE {FILTER}"))
            .bind(user_id)
            .bind(&filter.status)
            .bind(&filter.notification_type)
            .fetch_one(pool)
            .await?;

    let items = sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {COLUMNS} FROM notifications WHERE {FILTER}
         ORDER BY created_at DESC LIMIT $4 OFFSET $5"
    ))
    .bind(user_id)
    .bind(&filter.status)
    .bind(&filter.notification_type)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

/// Fetch one notification, scoped to its owner.
pub async fn get_for_user(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<NotificationRow>, sqlx::Error> {
    sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {COLUMNS} FROM notifications WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn insert(
    pool: &PgPool,
    user_id: Uuid,
    notification_type: &str,
    subject: &str,
    body: Option<&str>,
    reference: Option<(&str, Uuid)>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO notifications (user_id, notification_type, subject, body, ref_type, ref_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        ",
    )
    .bind(user_id)
    .bind(notification_type)
    .bind(subject)
    .bind(body)
    .bind(reference.map(|(kind, _)| kind))
    .bind(reference.map(|(_, id)| id))
    .fetch_one(pool)
    .await
}

pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND status = 'unread'")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Mark one notification read. Returns false when it does not exist or
/// belongs to someone else; marking an already-read row succeeds.
pub async fn mark_read(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE notifications
        SET status = 'read', read_at = COALESCE(read_at, now())
        WHERE id = $1 AND user_id = $2
        ",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE notifications SET status = 'read', read_at = now()
         WHERE user_id = $1 AND status = 'unread'",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_for_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
