use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::rbac::Role;
use crate::repo::{Page, like_pattern};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row used only by the login path; never serialized.
#[derive(Debug, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub password_hash: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub q: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const COLUMNS: &str =
    "id, email, name, role, phone, is_active, last_login_at, created_at, updated_at";

const FILTER: &str = r"
    ($1::text IS NULL OR name ILIKE $1 OR email ILIKE $1)
    AND ($2::text IS NULL OR role = $2)
    AND ($3::bool IS NULL OR is_active = $3)
";

pub async fn list(pool: &PgPool, filter: &UserFilter) -> Result<(Vec<UserRow>, i64), sqlx::Error> {
    let page = Page::new(filter.limit, filter.offset);
    let pattern = like_pattern(filter.q.as_deref());
    let role = filter.role.map(Role::as_str);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {FILTER}"))
        .bind(&pattern)
        .bind(role)
        .bind(filter.active)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {COLUMNS} FROM users WHERE {FILTER} ORDER BY name, created_at LIMIT $4 OFFSET $5"
    ))
    .bind(&pattern)
    .bind(role)
    .bind(filter.active)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_credentials(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserCredentials>, sqlx::Error> {
    sqlx::query_as::<_, UserCredentials>(
        "SELECT id, email, role, password_hash, is_active FROM users WHERE lower(email) = lower($1)",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn password_hash(pool: &PgPool, id: Uuid) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create(
    pool: &PgPool,
    new: &NewUser,
    password_hash: &str,
) -> Result<UserRow, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!(
        r"
        INSERT INTO users (email, name, password_hash, role, phone)
        VALUES (lower($1), $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "
    ))
    .bind(&new.email)
    .bind(&new.name)
    .bind(password_hash)
    .bind(new.role.as_str())
    .bind(&new.phone)
    .fetch_one(pool)
    .await
}

/// Partial update; `None` fields keep their current value.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    update: &UserUpdate,
    password_hash: Option<&str>,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!(
        r"
        UPDATE users SET
            email = COALESCE(lower($2), email),
            name = COALESCE($3, name),
            password_hash = COALESCE($4, password_hash),
            role = COALESCE($5, role),
            phone = COALESCE($6, phone),
            is_active = COALESCE($7, is_active)
        WHERE id = $1
        RETURNING {COLUMNS}
        "
    ))
    .bind(id)
    .bind(&update.email)
    .bind(&update.name)
    .bind(password_hash)
    .bind(update.role.map(Role::as_str))
    .bind(&update.phone)
    .bind(update.is_active)
    .fetch_optional(pool)
    .await
}

pub async fn set_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}

/// Soft delete. Returns false when the user does not exist.
pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET is_active = false WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn touch_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn exists_active(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND is_active)")
        .bind(id)
        .fetch_one(pool)
        .await
}
