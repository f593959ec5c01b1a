#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use staff_portal::config::Config;
use staff_portal::store::AppState;

pub const ADMIN_EMAIL: &str = "admin@portal.test";
pub const ADMIN_PASSWORD: &str = "testpassword";

/// Build a test `AppState` from the given pool.
///
/// - Seeds the default pipeline stages and the admin user
///   (`ADMIN_EMAIL` / `ADMIN_PASSWORD`)
/// - Uses the dev JWT secret and a log-only mailer config
pub async fn test_state(pool: PgPool) -> AppState {
    test_state_with(pool, |_| {}).await
}

/// Same as [`test_state`] with a hook to adjust the config first.
pub async fn test_state_with(pool: PgPool, adjust: impl FnOnce(&mut Config)) -> AppState {
    staff_portal::store::bootstrap::run(&pool, ADMIN_EMAIL, Some(ADMIN_PASSWORD))
        .await
        .expect("bootstrap failed");

    let mut config = Config::for_tests();
    config.admin_email = ADMIN_EMAIL.into();
    adjust(&mut config);
    AppState::new(pool, config)
}

/// Build the full application (routes, fallback, middleware) for the state.
pub fn test_router(state: AppState) -> Router {
    staff_portal::api::app(state)
}

/// Login as the bootstrap admin user. Returns the bearer token.
pub async fn admin_login(app: &Router) -> String {
    login(app, ADMIN_EMAIL, ADMIN_PASSWORD).await
}

pub async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = post_json(
        app,
        "",
        "/api/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed for {email}: {body}");
    body["token"]
        .as_str()
        .expect("login response missing token")
        .to_owned()
}

/// Create a user with `role` via the admin API, log in as them and return
/// `(user_id, token)`.
pub async fn create_user(app: &Router, admin_token: &str, role: &str, email: &str) -> (Uuid, String) {
    let password = "testpass123";
    let (status, body) = post_json(
        app,
        admin_token,
        "/api/users",
        serde_json::json!({
            "name": format!("{role} user"),
            "email": email,
            "password": password,
            "role": role,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create user failed: {body}");
    let user_id = id_of(&body);

    let token = login(app, email, password).await;
    (user_id, token)
}

/// Id of the first pipeline stage (by position).
pub async fn first_stage(app: &Router, token: &str) -> Uuid {
    let (status, body) = get_json(app, token, "/api/pipeline/stages").await;
    assert_eq!(status, StatusCode::OK, "list stages failed: {body}");
    id_of(&body[0])
}

/// Create an application in the default stage. Returns its id.
pub async fn create_application(app: &Router, token: &str, extra: Value) -> Uuid {
    let mut payload = serde_json::json!({ "amount_requested": 250_000, "purpose": "equipment" });
    if let (Some(target), Some(source)) = (payload.as_object_mut(), extra.as_object()) {
        target.extend(source.clone());
    }
    let (status, body) = post_json(app, token, "/api/applications", payload).await;
    assert_eq!(status, StatusCode::CREATED, "create application failed: {body}");
    id_of(&body)
}

pub fn id_of(body: &Value) -> Uuid {
    Uuid::parse_str(body["id"].as_str().expect("missing id")).expect("id is not a uuid")
}

/// Send a GET request with Bearer auth.
pub async fn get_json(app: &Router, token: &str, path: &str) -> (StatusCode, Value) {
    send(app, "GET", token, path, None).await
}

/// Send a POST request with Bearer auth and JSON body.
pub async fn post_json(app: &Router, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", token, path, Some(body)).await
}

/// Send a PUT request with Bearer auth and JSON body.
pub async fn put_json(app: &Router, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send(app, "PUT", token, path, Some(body)).await
}

/// Send a DELETE request with Bearer auth.
pub async fn delete_json(app: &Router, token: &str, path: &str) -> (StatusCode, Value) {
    send(app, "DELETE", token, path, None).await
}

/// Send a POST whose body is raw text labelled as JSON.
pub async fn post_raw(app: &Router, token: &str, path: &str, raw: &str) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("Content-Type", "application/json");
    if !token.is_empty() {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = builder.body(Body::from(raw.to_owned())).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

async fn send(
    app: &Router,
    method: &str,
    token: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if !token.is_empty() {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

/// Extract JSON body from a response.
async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
