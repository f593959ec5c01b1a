use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::helpers::{ApiQuery, ListResponse};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::rbac::{ADMIN, require_role};
use crate::repo::audit_log::{self, AuditFilter, AuditRow};
use crate::store::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/audit-log", get(list_audit_log))
}

async fn list_audit_log(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<AuditFilter>,
) -> Result<Json<ListResponse<AuditRow>>, ApiError> {
    require_role(&auth, ADMIN)?;
    Ok(Json(audit_log::list(&state.pool, &filter).await?.into()))
}
