use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::Page;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<Uuid>,
    pub detail: Option<serde_json::Value>,
    pub ip_addr: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<Uuid>,
    pub resource: Option<String>,
    pub resource_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const FILTER: &str = r"
    ($1::uuid IS NULL OR actor_id = $1)
    AND ($2::text IS NULL OR resource = $2)
    AND ($3::uuid IS NULL OR resource_id = $3)
    AND ($4::text IS NULL OR action = $4)
";

pub async fn list(pool: &PgPool, filter: &AuditFilter) -> Result<(Vec<AuditRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM audit_log WHERE {FILTER}"))
        .bind(filter.actor_id)
        .bind(&filter.resource)
        .bind(filter.resource_id)
        .bind(&filter.action)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, AuditRow>(&format!(
        r"
        SELECT id, actor_id, actor_name, action, resource, resource_id, detail, ip_addr, created_at
        FROM audit_log
        WHERE {FILTER}
        ORDER BY created_at DESC
        LIMIT $5 OFFSET $6
        "
    ))
    .bind(filter.actor_id)
    .bind(&filter.resource)
    .bind(filter.resource_id)
    .bind(&filter.action)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}
