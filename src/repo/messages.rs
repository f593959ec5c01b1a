//! Direct staff-to-staff messages, optionally linked to an application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::Page;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub recipient_id: Uuid,
    pub recipient_name: String,
    pub application_id: Option<Uuid>,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    pub recipient_id: Uuid,
    pub application_id: Option<Uuid>,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageFilter {
    /// Restrict to the conversation with this user.
    pub with_user: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const SELECT: &str = r"
    SELECT m.id, m.sender_id, s.name AS sender_name, m.recipient_id, r.name AS recipient_name,
           m.application_id, m.body, m.read_at, m.created_at
    FROM messages m
    JOIN users s ON s.id = m.sender_id
    JOIN users r ON r.id = m.recipient_id
";

const FILTER: &str = r"
    (m.sender_id = $1 OR m.recipient_id = $1)
    AND ($2::uuid IS NULL OR m.sender_id = $2 OR m.recipient_id = $2)
    AND ($3::uuid IS NULL OR m.application_id = $3)
";

/// Inbox and outbox of `user_id`, newest first.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    filter: &MessageFilter,
) -> Result<(Vec<MessageRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM messages m WHERE {FILTER}"))
        .bind(user_id)
        .bind(filter.with_user)
        .bind(filter.application_id)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, MessageRow>(&format!(
        "{SELECT} WHERE {FILTER} ORDER BY m.created_at DESC LIMIT $4 OFFSET $5"
    ))
    .bind(user_id)
    .bind(filter.with_user)
    .bind(filter.application_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

/// A message visible to `user_id` as sender or recipient.
pub async fn get_for_user(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<MessageRow>, sqlx::Error> {
    sqlx::query_as::<_, MessageRow>(&format!(
        "{SELECT} WHERE m.id = $1 AND (m.sender_id = $2 OR m.recipient_id = $2)"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn create(pool: &PgPool, sender_id: Uuid, new: &NewMessage) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r"
        INSERT INTO messages (sender_id, recipient_id, application_id, body)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        ",
    )
    .bind(sender_id)
    .bind(new.recipient_id)
    .bind(new.application_id)
    .bind(&new.body)
    .fetch_one(pool)
    .await
}

pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE recipient_id = $1 AND read_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}

/// Only the recipient can mark a message read.
pub async fn mark_read(pool: &PgPool, id: Uuid, recipient_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE messages SET read_at = COALESCE(read_at, now())
         WHERE id = $1 AND recipient_id = $2",
    )
    .bind(id)
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Only the sender can delete a message.
pub async fn delete_sent(pool: &PgPool, id: Uuid, sender_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM messages WHERE id = $1 AND sender_id = $2")
        .bind(id)
        .bind(sender_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
