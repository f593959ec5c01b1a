mod helpers;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use staff_portal::notify::email::Mailer;
use staff_portal::notify::outbox;
use staff_portal::repo::comms;

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn sms_to_contact_is_queued(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let (_, marketing) = helpers::create_user(&app, &admin, "marketing", "m@portal.test").await;

    let (_, contact) = helpers::post_json(
        &app,
        &marketing,
        "/api/contacts",
        json!({ "first_name": "Sam", "phone": "+1 555 010 3000" }),
    )
    .await;
    let contact_id = helpers::id_of(&contact);

    let (status, sms) = helpers::post_json(
        &app,
        &marketing,
        "/api/sms",
        json!({ "contact_id": contact_id, "body": "Your offer is ready." }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(sms["status"], "queued");
    assert_eq!(sms["to_number"], "+1 555 010 3000");
    assert_eq!(sms["direction"], "outbound");

    let (_, list) =
        helpers::get_json(&app, &marketing, &format!("/api/sms?contact_id={contact_id}")).await;
    assert_eq!(list["total"], 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn recipient_resolution_errors(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, body) =
        helpers::post_json(&app, &admin, "/api/sms", json!({ "body": "to nobody" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"][0], "either to or contact_id is required");

    let (_, contact) = helpers::post_json(
        &app,
        &admin,
        "/api/contacts",
        json!({ "first_name": "Phoneless" }),
    )
    .await;
    let contact_id = helpers::id_of(&contact);

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        "/api/email",
        json!({ "contact_id": contact_id, "subject": "Hi", "body": "Hello" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "contact has no email address on file");

    let (status, _) = helpers::post_json(
        &app,
        &admin,
        "/api/sms",
        json!({ "to": "not-a-number", "body": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = helpers::post_json(
        &app,
        &admin,
        "/api/email",
        json!({ "to": "a@b.example", "subject": "Two\r\nlines", "body": "x" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[sqlx::test(migrations = "./migrations")]
async fn partners_cannot_send(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let (_, lender) = helpers::create_user(&app, &admin, "lender", "l@portal.test").await;

    let (status, _) = helpers::post_json(
        &app,
        &lender,
        "/api/email",
        json!({ "to": "x@y.example", "subject": "s", "body": "b" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Outbox worker
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn outbox_delivers_queued_rows(pool: PgPool) {
    let state = helpers::test_state(pool.clone()).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (_, sms) = helpers::post_json(
        &app,
        &admin,
        "/api/sms",
        json!({ "to": "+1 555 010 4000", "body": "Funding confirmed" }),
    )
    .await;
    let sms_id = helpers::id_of(&sms);
    let (_, email) = helpers::post_json(
        &app,
        &admin,
        "/api/email",
        json!({ "to": "owner@client.example", "subject": "Welcome", "body": "Thanks for applying." }),
    )
    .await;
    let email_id = helpers::id_of(&email);

    let (_, health) = helpers::get_json(&app, "", "/api/health").await;
    assert_eq!(health["queued_sms"], 1);
    assert_eq!(health["queued_email"], 1);

    let report = outbox::process_once(&pool, &Mailer::log_only()).await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 0);

    let (_, sms) = helpers::get_json(&app, &admin, &format!("/api/sms/{sms_id}")).await;
    assert_eq!(sms["status"], "sent");
    assert_eq!(sms["provider_id"], format!("log-{sms_id}"));

    let (_, email) = helpers::get_json(&app, &admin, &format!("/api/email/{email_id}")).await;
    assert_eq!(email["status"], "sent");

    // Nothing left to claim.
    let report = outbox::process_once(&pool, &Mailer::log_only()).await.unwrap();
    assert_eq!(report.sent + report.failed, 0);

    let (_, health) = helpers::get_json(&app, "", "/api/health").await;
    assert_eq!(health["queued_sms"], 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn outbox_records_failures(pool: PgPool) {
    let state = helpers::test_state(pool.clone()).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    // Bypasses API validation to reach the transport with a bad number.
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO sms_logs (to_number, body) VALUES ('12', 'hi') RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    let report = outbox::process_once(&pool, &Mailer::log_only()).await.unwrap();
    assert_eq!(report.failed, 1);

    let (_, sms) = helpers::get_json(&app, &admin, &format!("/api/sms/{id}")).await;
    assert_eq!(sms["status"], "failed");
    assert!(sms["error"].as_str().is_some_and(|e| !e.is_empty()));

    let (_, failed) = helpers::get_json(&app, &admin, "/api/sms?status=failed").await;
    assert_eq!(failed["total"], 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_claim_is_delivered_again(pool: PgPool) {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO sms_logs (to_number, body) VALUES ('+1 555 010 4100', 'rate locked') RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    // A worker claims the row and dies before recording the outcome.
    let claimed = comms::claim_sms(&pool).await.unwrap();
    assert_eq!(claimed.len(), 1);

    // Still inside the lease: left alone.
    let report = outbox::process_once(&pool, &Mailer::log_only()).await.unwrap();
    assert_eq!(report.sent, 0);

    sqlx::query("UPDATE sms_logs SET claimed_at = now() - interval '1 hour' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();

    let report = outbox::process_once(&pool, &Mailer::log_only()).await.unwrap();
    assert_eq!(report.sent, 1);

    let (status, attempts): (String, i32) =
        sqlx::query_as("SELECT status, attempts FROM sms_logs WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "sent");
    assert_eq!(attempts, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_claim_out_of_attempts_is_failed(pool: PgPool) {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO email_logs (to_address, subject, body, status, attempts, claimed_at)
         VALUES ('cfo@client.example', 'Docs', 'Attached.', 'sending', $1, now() - interval '1 hour')
         RETURNING id",
    )
    .bind(comms::MAX_ATTEMPTS)
    .fetch_one(&pool)
    .await
    .unwrap();

    let report = outbox::process_once(&pool, &Mailer::log_only()).await.unwrap();
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.sent, 0);

    let (status, error): (String, Option<String>) =
        sqlx::query_as("SELECT status, error FROM email_logs WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "failed");
    assert!(error.is_some_and(|e| e.contains("abandoned")));
}

#[sqlx::test(migrations = "./migrations")]
async fn provider_status_callback(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (_, email) = helpers::post_json(
        &app,
        &admin,
        "/api/email",
        json!({ "to": "cfo@client.example", "subject": "Docs", "body": "Attached." }),
    )
    .await;
    let id = helpers::id_of(&email);

    let (status, body) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/email/{id}/status"),
        json!({ "status": "failed", "error": "mailbox full" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "mailbox full");

    let (status, _) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/email/{id}/status"),
        json!({ "status": "bounced" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/sms/{}/status", Uuid::new_v4()),
        json!({ "status": "sent" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Health and fallback
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn health_endpoints(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);

    let (status, _) = helpers::get_json(&app, "", "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = helpers::get_json(&app, "", "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
}

#[sqlx::test(migrations = "./migrations")]
async fn unknown_route_uses_error_envelope(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, body) = helpers::get_json(&app, &admin, "/api/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "success": false, "error": "route not found" }));
}

#[sqlx::test(migrations = "./migrations")]
async fn oversized_body_uses_error_envelope(pool: PgPool) {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let notes = "x".repeat(3 * 1024 * 1024);
    let raw = json!({ "name": "Bulky Co", "notes": notes }).to_string();

    // Declared length over the limit: rejected before any handler runs.
    let req = Request::builder()
        .method("POST")
        .uri("/api/companies")
        .header("Content-Type", "application/json")
        .header("Content-Length", raw.len())
        .header("Authorization", format!("Bearer {admin}"))
        .body(Body::from(raw.clone()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let bytes = http_body_util::BodyExt::collect(resp.into_body())
        .await
        .unwrap()
        .to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "success": false, "error": "request body too large" }));

    // No declared length: the JSON extractor hits the limit while reading.
    let (status, body) = helpers::post_raw(&app, &admin, "/api/companies", &raw).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "request body too large");
}
