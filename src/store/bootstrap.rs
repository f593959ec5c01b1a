use sqlx::PgPool;

use crate::auth::password;

struct StageDef {
    name: &'static str,
    color: &'static str,
    is_terminal: bool,
}

const DEFAULT_STAGES: &[StageDef] = &[
    StageDef {
        name: "New Lead",
        color: "#64748b",
        is_terminal: false,
    },
    StageDef {
        name: "Application Submitted",
        color: "#2563eb",
        is_terminal: false,
    },
    StageDef {
        name: "Underwriting",
        color: "#7c3aed",
        is_terminal: false,
    },
    StageDef {
        name: "Offer Issued",
        color: "#d97706",
        is_terminal: false,
    },
    StageDef {
        name: "Funded",
        color: "#16a34a",
        is_terminal: true,
    },
    StageDef {
        name: "Declined",
        color: "#dc2626",
        is_terminal: true,
    },
];

/// Seed first-run data: default pipeline stages when none exist and the
/// admin account when the users table is empty.
#[tracing::instrument(skip(pool, admin_password), err)]
pub async fn run(
    pool: &PgPool,
    admin_email: &str,
    admin_password: Option<&str>,
) -> anyhow::Result<()> {
    seed_stages(pool).await?;
    seed_admin(pool, admin_email, admin_password).await?;
    Ok(())
}

async fn seed_stages(pool: &PgPool) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pipeline_stages")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    for (position, stage) in (0i32..).zip(DEFAULT_STAGES) {
        sqlx::query(
            "INSERT INTO pipeline_stages (name, position, color, is_terminal)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(stage.name)
        .bind(position)
        .bind(stage.color)
        .bind(stage.is_terminal)
        .execute(pool)
        .await?;
    }

    tracing::info!(count = DEFAULT_STAGES.len(), "pipeline stages seeded");
    Ok(())
}

async fn seed_admin(
    pool: &PgPool,
    admin_email: &str,
    admin_password: Option<&str>,
) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("bootstrap skipped, users already exist");
        return Ok(());
    }

    let plain = admin_password.unwrap_or_else(|| {
        tracing::warn!("PORTAL_ADMIN_PASSWORD not set; using the default admin password");
        "admin"
    });
    let password_hash = password::hash_password(plain)?;

    let admin_id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, name, password_hash, role)
         VALUES ($1, 'Administrator', $2, 'admin')
         RETURNING id",
    )
    .bind(admin_email.to_lowercase())
    .bind(&password_hash)
    .fetch_one(pool)
    .await?;

    tracing::info!(user_id = %admin_id, "admin user created");
    Ok(())
}
