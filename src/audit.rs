use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;

pub struct AuditEntry<'a> {
    pub actor_id: Uuid,
    pub actor_name: &'a str,
    pub action: &'a str,
    pub resource: &'a str,
    pub resource_id: Option<Uuid>,
    pub detail: Option<serde_json::Value>,
    pub ip_addr: Option<&'a str>,
}

impl<'a> AuditEntry<'a> {
    /// Entry attributed to the authenticated caller.
    pub fn by(
        auth: &'a AuthUser,
        action: &'a str,
        resource: &'a str,
        resource_id: Option<Uuid>,
    ) -> Self {
        Self {
            actor_id: auth.user_id,
            actor_name: &auth.user_name,
            action,
            resource,
            resource_id,
            detail: None,
            ip_addr: auth.ip_addr.as_deref(),
        }
    }

    #[must_use]
    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Append an audit row. Failures are logged, never surfaced to the caller.
pub async fn write_audit(pool: &PgPool, entry: &AuditEntry<'_>) {
    if let Err(e) = write_audit_inner(pool, entry).await {
        tracing::warn!(
            error = %e,
            action = entry.action,
            resource = entry.resource,
            "failed to write audit log entry"
        );
    }
}

async fn write_audit_inner(pool: &PgPool, entry: &AuditEntry<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO audit_log (actor_id, actor_name, action, resource, resource_id, detail, ip_addr)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ",
    )
    .bind(entry.actor_id)
    .bind(entry.actor_name)
    .bind(entry.action)
    .bind(entry.resource)
    .bind(entry.resource_id)
    .bind(&entry.detail)
    .bind(entry.ip_addr)
    .execute(pool)
    .await?;

    Ok(())
}
