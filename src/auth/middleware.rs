use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::token;
use crate::error::ApiError;
use crate::rbac::Role;
use crate::store::AppState;

/// Authenticated user extracted from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub user_name: String,
    pub email: String,
    /// Role as stored in the database at request time, not the token claim.
    pub role: Role,
    pub ip_addr: Option<String>,
}

#[derive(sqlx::FromRow)]
struct UserAuthLookup {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    is_active: bool,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ip_addr = client_ip(parts, state.config.trust_proxy_headers);

        let raw = bearer(parts).ok_or(ApiError::Unauthorized)?;
        let claims =
            token::verify(&state.config.jwt_secret, raw).ok_or(ApiError::Unauthorized)?;

        let user = lookup_user(&state.pool, claims.sub)
            .await?
            .ok_or(ApiError::Unauthorized)?;
        if !user.is_active {
            return Err(ApiError::Unauthorized);
        }

        // A role the server does not know cannot pass any allow-list.
        let role: Role = user.role.parse().map_err(|e: anyhow::Error| {
            tracing::warn!(user_id = %user.id, error = %e, "user has unknown role");
            ApiError::Forbidden
        })?;

        Ok(Self {
            user_id: user.id,
            user_name: user.name,
            email: user.email,
            role,
            ip_addr,
        })
    }
}

/// Caller address for handlers that run before a user is known, such as
/// login.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(client_ip(parts, state.config.trust_proxy_headers)))
    }
}

/// Token from `Authorization: Bearer <jwt>`; the scheme is case sensitive.
fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Client address for the audit trail. `X-Forwarded-For` counts only when
/// the portal runs behind a trusted proxy.
fn client_ip(parts: &Parts, trust_proxy: bool) -> Option<String> {
    let forwarded = trust_proxy
        .then(|| parts.headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_owned());
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

async fn lookup_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserAuthLookup>, sqlx::Error> {
    sqlx::query_as::<_, UserAuthLookup>(
        "SELECT id, name, email, role, is_active FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use rstest::rstest;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/auth/me");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[rstest]
    #[case(Some("Bearer eyJhbGciOiJIUzI1NiJ9.e30.sig"), Some("eyJhbGciOiJIUzI1NiJ9.e30.sig"))]
    #[case(None, None)]
    #[case(Some("Bearer "), None)]
    #[case(Some("bearer abc"), None)]
    #[case(Some("Basic YWRtaW46YWRtaW4="), None)]
    fn bearer_cases(#[case] header: Option<&str>, #[case] expected: Option<&str>) {
        let headers: Vec<(&str, &str)> = header.map(|h| ("authorization", h)).into_iter().collect();
        let parts = parts_with(&headers);
        assert_eq!(bearer(&parts), expected);
    }

    #[rstest]
    #[case(true, Some("203.0.113.7"))]
    #[case(false, None)]
    fn forwarded_for_needs_trusted_proxy(#[case] trust: bool, #[case] expected: Option<&str>) {
        let parts = parts_with(&[("x-forwarded-for", "203.0.113.7, 10.0.0.2")]);
        assert_eq!(client_ip(&parts, trust).as_deref(), expected);
    }

    #[test]
    fn socket_address_fallback() {
        let mut parts = parts_with(&[]);
        parts
            .extensions
            .insert(ConnectInfo("192.0.2.10:51000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&parts, true).as_deref(), Some("192.0.2.10"));
    }
}
