pub mod applications;
pub mod audit;
pub mod auth;
pub mod comms;
pub mod companies;
pub mod contacts;
pub mod deals;
pub mod documents;
pub mod health;
pub mod helpers;
pub mod lenders;
pub mod messages;
pub mod notifications;
pub mod pipeline;
pub mod products;
pub mod tags;
pub mod users;

use axum::Router;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::store::AppState;

/// Request bodies above this size are rejected with 413.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(companies::router())
        .merge(contacts::router())
        .merge(lenders::router())
        .merge(products::router())
        .merge(pipeline::router())
        .merge(applications::router())
        .merge(deals::router())
        .merge(tags::router())
        .merge(documents::router())
        .merge(notifications::router())
        .merge(messages::router())
        .merge(comms::router())
        .merge(audit::router())
}

/// Full application: routes, 404 fallback and the HTTP middleware stack.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    router()
        .fallback(health::fallback)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum::middleware::map_response(envelope_oversized))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The body limit layer answers 413 in plain text; give it the JSON envelope.
async fn envelope_oversized(resp: Response) -> Response {
    if resp.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge.into_response();
    }
    resp
}

/// CORS for the configured frontend origins; no origins means same-origin only.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
