//! SMS and email logs. Both tables double as the outbound queue: rows are
//! inserted `queued` and advanced by the outbox worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::Page;

pub const STATUSES: &[&str] = &["queued", "sending", "sent", "failed"];

/// Rows claimed per worker tick.
pub const CLAIM_BATCH: i64 = 25;

/// A `sending` row older than this is treated as abandoned by its worker.
pub const CLAIM_LEASE: std::time::Duration = std::time::Duration::from_secs(300);

/// Delivery attempts before an abandoned row is marked `failed`.
pub const MAX_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sms,
    Email,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Sms => "sms_logs",
            Self::Email => "email_logs",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SmsRow {
    pub id: Uuid,
    pub contact_id: Option<Uuid>,
    pub to_number: String,
    pub body: String,
    pub direction: String,
    pub status: String,
    pub provider_id: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub sent_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmailRow {
    pub id: Uuid,
    pub contact_id: Option<Uuid>,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub provider_id: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub sent_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogFilter {
    pub status: Option<String>,
    pub contact_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Delivery status reported by a provider callback or the worker.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub provider_id: Option<String>,
    pub error: Option<String>,
}

const SMS_COLUMNS: &str = r"
    id, contact_id, to_number, body, direction, status, provider_id, error, attempts, sent_by,
    created_at, updated_at
";

const EMAIL_COLUMNS: &str = r"
    id, contact_id, to_address, subject, body, status, provider_id, error, attempts, sent_by,
    created_at, updated_at
";

const FILTER: &str = r"
    ($1::text IS NULL OR status = $1)
    AND ($2::uuid IS NULL OR contact_id = $2)
";

async fn count(pool: &PgPool, channel: Channel, filter: &LogFilter) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE {FILTER}",
        channel.table()
    ))
    .bind(&filter.status)
    .bind(filter.contact_id)
    .fetch_one(pool)
    .await
}

pub async fn list_sms(pool: &PgPool, filter: &LogFilter) -> Result<(Vec<SmsRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);
    let total = count(pool, Channel::Sms, filter).await?;
    let items = sqlx::query_as::<_, SmsRow>(&format!(
        "SELECT {SMS_COLUMNS} FROM sms_logs WHERE {FILTER} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(&filter.status)
    .bind(filter.contact_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    Ok((items, total))
}

pub async fn list_email(
    pool: &PgPool,
    filter: &LogFilter,
) -> Result<(Vec<EmailRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);
    let total = count(pool, Channel::Email, filter).await?;
    let items = sqlx::query_as::<_, EmailRow>(&format!(
        "SELECT {EMAIL_COLUMNS} FROM email_logs WHERE {FILTER} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(&filter.status)
    .bind(filter.contact_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    Ok((items, total))
}

pub async fn get_sms(pool: &PgPool, id: Uuid) -> Result<Option<SmsRow>, sqlx::Error> {
    sqlx::query_as::<_, SmsRow>(&format!("SELECT {SMS_COLUMNS} FROM sms_logs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_email(pool: &PgPool, id: Uuid) -> Result<Option<EmailRow>, sqlx::Error> {
    sqlx::query_as::<_, EmailRow>(&format!(
        "SELECT {EMAIL_COLUMNS} FROM email_logs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn enqueue_sms(
    pool: &PgPool,
    contact_id: Option<Uuid>,
    to_number: &str,
    body: &str,
    sent_by: Uuid,
) -> Result<SmsRow, sqlx::Error> {
    sqlx::query_as::<_, SmsRow>(&format!(
        r"
        INSERT INTO sms_logs (contact_id, to_number, body, sent_by)
        VALUES ($1, $2, $3, $4)
        RETURNING {SMS_COLUMNS}
        "
    ))
    .bind(contact_id)
    .bind(to_number)
    .bind(body)
    .bind(sent_by)
    .fetch_one(pool)
    .await
}

pub async fn enqueue_email(
    pool: &PgPool,
    contact_id: Option<Uuid>,
    to_address: &str,
    subject: &str,
    body: &str,
    sent_by: Uuid,
) -> Result<EmailRow, sqlx::Error> {
    sqlx::query_as::<_, EmailRow>(&format!(
        r"
        INSERT INTO email_logs (contact_id, to_address, subject, body, sent_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {EMAIL_COLUMNS}
        "
    ))
    .bind(contact_id)
    .bind(to_address)
    .bind(subject)
    .bind(body)
    .bind(sent_by)
    .fetch_one(pool)
    .await
}

/// Row selection shared by both claim queries: queued rows plus `sending`
/// rows whose lease ran out and that still have attempts left.
fn claim_sql(table: &str, columns: &str) -> String {
    format!(
        r"
        UPDATE {table} SET status = 'sending', attempts = attempts + 1, claimed_at = now()
        WHERE id IN (
            SELECT id FROM {table}
            WHERE status = 'queued'
               OR (status = 'sending'
                   AND claimed_at < now() - make_interval(secs => $2)
                   AND attempts < $3)
            ORDER BY created_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {columns}
        "
    )
}

/// Claim up to [`CLAIM_BATCH`] SMS rows, oldest first. Claimed rows move to
/// `sending`; concurrent claimers skip rows already locked.
pub async fn claim_sms(pool: &PgPool) -> Result<Vec<SmsRow>, sqlx::Error> {
    sqlx::query_as::<_, SmsRow>(&claim_sql(Channel::Sms.table(), SMS_COLUMNS))
        .bind(CLAIM_BATCH)
        .bind(CLAIM_LEASE.as_secs_f64())
        .bind(MAX_ATTEMPTS)
        .fetch_all(pool)
        .await
}

/// Email counterpart of [`claim_sms`].
pub async fn claim_email(pool: &PgPool) -> Result<Vec<EmailRow>, sqlx::Error> {
    sqlx::query_as::<_, EmailRow>(&claim_sql(Channel::Email.table(), EMAIL_COLUMNS))
        .bind(CLAIM_BATCH)
        .bind(CLAIM_LEASE.as_secs_f64())
        .bind(MAX_ATTEMPTS)
        .fetch_all(pool)
        .await
}

/// Fail `sending` rows whose lease expired after the last allowed attempt.
pub async fn fail_abandoned(pool: &PgPool, channel: Channel) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(&format!(
        r"
        UPDATE {} SET
            status = 'failed',
            error = 'delivery abandoned after ' || attempts || ' attempt(s)'
        WHERE status = 'sending'
          AND claimed_at < now() - make_interval(secs => $1)
          AND attempts >= $2
        ",
        channel.table()
    ))
    .bind(CLAIM_LEASE.as_secs_f64())
    .bind(MAX_ATTEMPTS)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Record a final or intermediate delivery status. `provider_id` and
/// `error` keep their previous value when not supplied.
pub async fn set_status(
    pool: &PgPool,
    channel: Channel,
    id: Uuid,
    update: &StatusUpdate,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(&format!(
        r"
        UPDATE {} SET
            status = $2,
            provider_id = COALESCE($3, provider_id),
            error = COALESCE($4, error)
        WHERE id = $1
        ",
        channel.table()
    ))
    .bind(id)
    .bind(&update.status)
    .bind(&update.provider_id)
    .bind(&update.error)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Queue depth per channel, used by the health endpoint.
pub async fn queued_count(pool: &PgPool, channel: Channel) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE status = 'queued'",
        channel.table()
    ))
    .fetch_one(pool)
    .await
}
