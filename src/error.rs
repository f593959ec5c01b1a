use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error")]
    Validation(Vec<String>),

    #[error("too many requests")]
    TooManyRequests,

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn envelope(error: &str) -> serde_json::Value {
    serde_json::json!({ "success": false, "error": error })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, envelope(&self.to_string())),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, envelope("unauthorized")),
            Self::Forbidden => (StatusCode::FORBIDDEN, envelope("forbidden")),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, envelope(msg)),
            Self::Conflict(msg) => (StatusCode::CONFLICT, envelope(msg)),
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "success": false,
                    "error": "validation error",
                    "fields": errors,
                }),
            ),
            Self::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, envelope("too many requests")),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                envelope("request body too large"),
            ),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, envelope(msg)),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    envelope("internal server error"),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("resource".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => Self::Conflict("resource already exists".into()),
                Some("23503") => {
                    Self::Conflict("resource is referenced by or references missing data".into())
                }
                Some("23514") => Self::BadRequest("value violates a check constraint".into()),
                _ => {
                    tracing::error!(error = %err, "database error");
                    Self::Internal(err.into())
                }
            },
            _ => {
                tracing::error!(error = %err, "database error");
                Self::Internal(err.into())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
