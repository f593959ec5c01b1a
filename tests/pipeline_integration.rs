mod helpers;

use axum::Router;
use axum::http::StatusCode;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

async fn stage_ids(app: &Router, token: &str) -> Vec<Uuid> {
    let (_, body) = helpers::get_json(app, token, "/api/pipeline/stages").await;
    body.as_array()
        .unwrap()
        .iter()
        .map(helpers::id_of)
        .collect()
}

/// Application ids in column order for the stage.
async fn column(app: &Router, token: &str, stage_id: Uuid) -> Vec<Uuid> {
    let (status, board) = helpers::get_json(app, token, "/api/pipeline").await;
    assert_eq!(status, StatusCode::OK);
    let col = board
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"] == stage_id.to_string())
        .expect("stage missing from board");
    let cards = col["applications"].as_array().unwrap();
    for (i, card) in cards.iter().enumerate() {
        assert_eq!(card["position"], i as i64, "positions must be dense");
    }
    cards.iter().map(helpers::id_of).collect()
}

async fn move_to(
    app: &Router,
    token: &str,
    application_id: Uuid,
    stage_id: Uuid,
    position: Option<i32>,
) -> (StatusCode, Value) {
    helpers::post_json(
        app,
        token,
        "/api/pipeline/move",
        json!({ "application_id": application_id, "stage_id": stage_id, "position": position }),
    )
    .await
}

// ---------------------------------------------------------------------------
// Board and moves
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn board_lists_seeded_stages_in_order(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, board) = helpers::get_json(&app, &admin, "/api/pipeline").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = board
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        [
            "New Lead",
            "Application Submitted",
            "Underwriting",
            "Offer Issued",
            "Funded",
            "Declined"
        ]
    );
    assert!(board[0]["applications"].as_array().unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn new_applications_append_to_first_stage(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let first = helpers::first_stage(&app, &admin).await;

    let a = helpers::create_application(&app, &admin, json!({})).await;
    let b = helpers::create_application(&app, &admin, json!({})).await;

    assert_eq!(column(&app, &admin, first).await, vec![a, b]);

    let (_, body) = helpers::get_json(&app, &admin, &format!("/api/applications/{b}")).await;
    assert_eq!(body["stage_name"], "New Lead");
    assert_eq!(body["status"], "draft");
    assert!(body["submitted_at"].is_null());
}

#[sqlx::test(migrations = "./migrations")]
async fn move_between_columns_keeps_positions_dense(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let stages = stage_ids(&app, &admin).await;
    let (src, dst) = (stages[0], stages[1]);

    let a = helpers::create_application(&app, &admin, json!({})).await;
    let b = helpers::create_application(&app, &admin, json!({})).await;
    let c = helpers::create_application(&app, &admin, json!({})).await;
    let d = helpers::create_application(&app, &admin, json!({ "stage_id": dst })).await;

    let (status, body) = move_to(&app, &admin, b, dst, Some(0)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["position"], 0);
    assert_eq!(body["stage_id"], dst.to_string());

    assert_eq!(column(&app, &admin, src).await, vec![a, c]);
    assert_eq!(column(&app, &admin, dst).await, vec![b, d]);

    // No position means the end of the column; oversized positions clamp.
    move_to(&app, &admin, a, dst, None).await;
    move_to(&app, &admin, c, dst, Some(99)).await;
    assert_eq!(column(&app, &admin, dst).await, vec![b, d, a, c]);
    assert!(column(&app, &admin, src).await.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn move_within_column_reorders(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let first = helpers::first_stage(&app, &admin).await;

    let a = helpers::create_application(&app, &admin, json!({})).await;
    let b = helpers::create_application(&app, &admin, json!({})).await;
    let c = helpers::create_application(&app, &admin, json!({})).await;

    move_to(&app, &admin, c, first, Some(0)).await;
    assert_eq!(column(&app, &admin, first).await, vec![c, a, b]);

    move_to(&app, &admin, c, first, Some(2)).await;
    assert_eq!(column(&app, &admin, first).await, vec![a, b, c]);
}

#[sqlx::test(migrations = "./migrations")]
async fn move_unknown_targets_are_404(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let first = helpers::first_stage(&app, &admin).await;
    let a = helpers::create_application(&app, &admin, json!({})).await;

    let (status, body) = move_to(&app, &admin, Uuid::new_v4(), first, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "application not found");

    let (status, body) = move_to(&app, &admin, a, Uuid::new_v4(), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "stage not found");

    // The failed move left the card where it was.
    assert_eq!(column(&app, &admin, first).await, vec![a]);
}

#[sqlx::test(migrations = "./migrations")]
async fn move_notifies_assignee_and_audits(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let (staff_id, staff) = helpers::create_user(&app, &admin, "staff", "s@portal.test").await;
    let stages = stage_ids(&app, &admin).await;

    let app_id =
        helpers::create_application(&app, &admin, json!({ "assigned_to": staff_id })).await;

    let (_, body) = helpers::get_json(&app, &staff, "/api/notifications").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["notification_type"], "application_assigned");

    let (status, _) = move_to(&app, &admin, app_id, stages[2], None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) =
        helpers::get_json(&app, &staff, "/api/notifications?type=application_moved").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["ref_type"], "application");
    assert_eq!(body["items"][0]["ref_id"], app_id.to_string());
    assert!(
        body["items"][0]["body"]
            .as_str()
            .unwrap()
            .contains("Underwriting")
    );

    let (_, audit) = helpers::get_json(
        &app,
        &admin,
        &format!("/api/audit-log?action=application.move&resource_id={app_id}"),
    )
    .await;
    assert_eq!(audit["total"], 1);
    assert_eq!(audit["items"][0]["detail"]["from"], stages[0].to_string());
    assert_eq!(audit["items"][0]["detail"]["to"], stages[2].to_string());
}

#[sqlx::test(migrations = "./migrations")]
async fn self_move_does_not_notify(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let (staff_id, staff) = helpers::create_user(&app, &admin, "staff", "s@portal.test").await;
    let stages = stage_ids(&app, &admin).await;

    let app_id =
        helpers::create_application(&app, &staff, json!({ "assigned_to": staff_id })).await;
    move_to(&app, &staff, app_id, stages[1], None).await;

    let (_, body) = helpers::get_json(&app, &staff, "/api/notifications/unread-count").await;
    assert_eq!(body["count"], 0);
}

// ---------------------------------------------------------------------------
// Applications
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn application_update_applies_stage_change_as_move(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let stages = stage_ids(&app, &admin).await;

    let a = helpers::create_application(&app, &admin, json!({})).await;
    let b = helpers::create_application(&app, &admin, json!({})).await;
    let existing = helpers::create_application(&app, &admin, json!({ "stage_id": stages[1] })).await;

    let (status, body) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/applications/{a}"),
        json!({ "stage_id": stages[1], "status": "submitted" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage_id"], stages[1].to_string());
    assert_eq!(body["status"], "submitted");
    assert!(body["submitted_at"].is_string());

    assert_eq!(column(&app, &admin, stages[0]).await, vec![b]);
    assert_eq!(column(&app, &admin, stages[1]).await, vec![existing, a]);
}

#[sqlx::test(migrations = "./migrations")]
async fn application_update_to_unknown_stage_changes_nothing(pool: PgPool) {
    let state = helpers::test_state(pool.clone()).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let stages = stage_ids(&app, &admin).await;

    let id = helpers::create_application(&app, &admin, json!({})).await;
    let (_, before) = helpers::get_json(&app, &admin, &format!("/api/applications/{id}")).await;

    let (status, body) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/applications/{id}"),
        json!({ "stage_id": Uuid::new_v4(), "status": "submitted", "amount_requested": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (_, after) = helpers::get_json(&app, &admin, &format!("/api/applications/{id}")).await;
    assert_eq!(after["status"], before["status"]);
    assert_eq!(after["amount_requested"], before["amount_requested"]);
    assert!(after["submitted_at"].is_null());
    assert_eq!(after["stage_id"], stages[0].to_string());
    assert_eq!(column(&app, &admin, stages[0]).await, vec![id]);

    let audited: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_log WHERE action = 'application.update' AND resource_id = $1",
    )
    .bind(id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(audited, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn submitted_at_is_kept_after_first_submit(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let id = helpers::create_application(&app, &admin, json!({ "status": "submitted" })).await;
    let (_, first) = helpers::get_json(&app, &admin, &format!("/api/applications/{id}")).await;
    let submitted_at = first["submitted_at"].clone();
    assert!(submitted_at.is_string());

    helpers::put_json(
        &app,
        &admin,
        &format!("/api/applications/{id}"),
        json!({ "status": "in_review" }),
    )
    .await;
    let (_, body) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/applications/{id}"),
        json!({ "status": "submitted" }),
    )
    .await;
    assert_eq!(body["submitted_at"], submitted_at);
}

#[sqlx::test(migrations = "./migrations")]
async fn application_validation_and_filters(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        "/api/applications",
        json!({ "amount_requested": -5, "status": "pending" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"].as_array().unwrap().len(), 2);

    helpers::create_application(&app, &admin, json!({ "status": "submitted" })).await;
    helpers::create_application(&app, &admin, json!({})).await;

    let (_, body) = helpers::get_json(&app, &admin, "/api/applications?status=submitted").await;
    assert_eq!(body["total"], 1);
    let (_, body) = helpers::get_json(&app, &admin, "/api/applications").await;
    assert_eq!(body["total"], 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn deleting_application_closes_column_gap(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let first = helpers::first_stage(&app, &admin).await;

    let a = helpers::create_application(&app, &admin, json!({})).await;
    let b = helpers::create_application(&app, &admin, json!({})).await;
    let c = helpers::create_application(&app, &admin, json!({})).await;

    let (status, _) = helpers::delete_json(&app, &admin, &format!("/api/applications/{b}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(column(&app, &admin, first).await, vec![a, c]);

    let (status, _) = helpers::delete_json(&app, &admin, &format!("/api/applications/{b}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn stage_create_update_delete(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, stage) = helpers::post_json(
        &app,
        &admin,
        "/api/pipeline/stages",
        json!({ "name": "Docs Pending", "color": "#0ea5e9" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stage["position"], 6);
    assert_eq!(stage["application_count"], 0);
    let id = helpers::id_of(&stage);

    let (status, body) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/pipeline/stages/{id}"),
        json!({ "is_terminal": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_terminal"], true);
    assert_eq!(body["name"], "Docs Pending");

    let (status, _) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/pipeline/stages/{id}"),
        json!({ "color": "blue" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) =
        helpers::delete_json(&app, &admin, &format!("/api/pipeline/stages/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stage_ids(&app, &admin).await.len(), 6);
}

#[sqlx::test(migrations = "./migrations")]
async fn stage_in_use_cannot_be_deleted(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let first = helpers::first_stage(&app, &admin).await;
    helpers::create_application(&app, &admin, json!({})).await;

    let (status, body) =
        helpers::delete_json(&app, &admin, &format!("/api/pipeline/stages/{first}")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "stage still holds 1 application(s)");
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_stage_name_conflicts(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, _) = helpers::post_json(
        &app,
        &admin,
        "/api/pipeline/stages",
        json!({ "name": "Funded" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "./migrations")]
async fn reorder_stages(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let mut ids = stage_ids(&app, &admin).await;
    ids.reverse();

    let (status, body) = helpers::put_json(
        &app,
        &admin,
        "/api/pipeline/stages/reorder",
        json!({ "stage_ids": ids }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Declined");
    assert_eq!(body[5]["name"], "New Lead");
    assert_eq!(stage_ids(&app, &admin).await, ids);

    let (status, _) = helpers::put_json(
        &app,
        &admin,
        "/api/pipeline/stages/reorder",
        json!({ "stage_ids": [ids[0], ids[0]] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = helpers::put_json(
        &app,
        &admin,
        "/api/pipeline/stages/reorder",
        json!({ "stage_ids": [] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Deals
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn deal_closed_at_follows_status(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, deal) = helpers::post_json(
        &app,
        &admin,
        "/api/deals",
        json!({ "title": "Fleet refinance", "amount": 750_000, "expected_close_date": "2026-12-01" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deal["status"], "open");
    assert!(deal["closed_at"].is_null());
    assert_eq!(deal["expected_close_date"], "2026-12-01");
    let id = helpers::id_of(&deal);

    let (_, won) =
        helpers::put_json(&app, &admin, &format!("/api/deals/{id}"), json!({ "status": "won" }))
            .await;
    assert!(won["closed_at"].is_string());

    // Editing other fields keeps the original close time.
    let (_, edited) =
        helpers::put_json(&app, &admin, &format!("/api/deals/{id}"), json!({ "amount": 800_000 }))
            .await;
    assert_eq!(edited["closed_at"], won["closed_at"]);

    let (_, reopened) =
        helpers::put_json(&app, &admin, &format!("/api/deals/{id}"), json!({ "status": "open" }))
            .await;
    assert!(reopened["closed_at"].is_null());

    let (_, body) = helpers::get_json(&app, &admin, "/api/deals?status=open").await;
    assert_eq!(body["total"], 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn deal_validation(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let (_, marketing) = helpers::create_user(&app, &admin, "marketing", "m@portal.test").await;

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        "/api/deals",
        json!({ "status": "maybe", "amount": -1 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"].as_array().unwrap().len(), 3);

    let (status, _) =
        helpers::post_json(&app, &marketing, "/api/deals", json!({ "title": "Nope" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
