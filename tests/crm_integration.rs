mod helpers;

use axum::Router;
use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

async fn create_company(app: &Router, token: &str, name: &str) -> Uuid {
    let (status, body) =
        helpers::post_json(app, token, "/api/companies", json!({ "name": name })).await;
    assert_eq!(status, StatusCode::CREATED, "create company failed: {body}");
    helpers::id_of(&body)
}

async fn create_lender(app: &Router, token: &str, body: serde_json::Value) -> Uuid {
    let (status, body) = helpers::post_json(app, token, "/api/lenders", body).await;
    assert_eq!(status, StatusCode::CREATED, "create lender failed: {body}");
    helpers::id_of(&body)
}

// ---------------------------------------------------------------------------
// Companies and contacts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn company_crud_and_owner_default(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let (staff_id, staff) = helpers::create_user(&app, &admin, "staff", "s@portal.test").await;

    let (status, body) = helpers::post_json(
        &app,
        &staff,
        "/api/companies",
        json!({ "name": "Harbor Freight Co", "industry": "logistics", "website": "https://harbor.example" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["owner_id"], staff_id.to_string());
    assert_eq!(body["contact_count"], 0);
    let id = helpers::id_of(&body);

    let (status, body) = helpers::put_json(
        &app,
        &staff,
        &format!("/api/companies/{id}"),
        json!({ "city": "Tacoma" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["city"], "Tacoma");
    assert_eq!(body["industry"], "logistics");

    let (status, _) = helpers::delete_json(&app, &staff, &format!("/api/companies/{id}")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = helpers::get_json(&app, &staff, &format!("/api/companies/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "./migrations")]
async fn company_validation(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        "/api/companies",
        json!({ "website": "ftp://nope", "email": "bad" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    assert!(fields.contains(&"name is required"));
    assert_eq!(fields.len(), 3);
}

#[sqlx::test(migrations = "./migrations")]
async fn company_search_and_paging(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    for name in ["Alpha Bakery", "Beta Bakery", "Gamma Motors"] {
        create_company(&app, &admin, name).await;
    }

    let (_, body) = helpers::get_json(&app, &admin, "/api/companies?q=bakery").await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][0]["name"], "Alpha Bakery");

    let (_, body) = helpers::get_json(&app, &admin, "/api/companies?limit=1&offset=1").await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["name"], "Beta Bakery");
}

#[sqlx::test(migrations = "./migrations")]
async fn contacts_link_to_company(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let company_id = create_company(&app, &admin, "Northwind").await;

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        "/api/contacts",
        json!({
            "first_name": "Dana",
            "last_name": "Reyes",
            "email": "dana@northwind.example",
            "phone": "(555) 010-7788",
            "company_id": company_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["company_name"], "Northwind");

    let (_, body) = helpers::get_json(&app, &admin, &format!("/api/companies/{company_id}")).await;
    assert_eq!(body["contact_count"], 1);

    let (_, body) = helpers::get_json(&app, &admin, "/api/contacts?q=dana%20reyes").await;
    assert_eq!(body["total"], 1);

    let (_, body) =
        helpers::get_json(&app, &admin, &format!("/api/contacts?company_id={company_id}")).await;
    assert_eq!(body["total"], 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn contact_with_missing_company_conflicts(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        "/api/contacts",
        json!({ "first_name": "Lost", "company_id": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn tag_assign_filter_unassign(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let hot = create_company(&app, &admin, "Hot Lead LLC").await;
    create_company(&app, &admin, "Cold Lead LLC").await;

    let (status, tag) =
        helpers::post_json(&app, &admin, "/api/tags", json!({ "name": "hot" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag["color"], "#64748b");
    let tag_id = helpers::id_of(&tag);

    let target = json!({ "entity_type": "company", "entity_id": hot });
    let (status, body) =
        helpers::post_json(&app, &admin, &format!("/api/tags/{tag_id}/assign"), target.clone())
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], true);

    // Second assignment is a no-op.
    let (_, body) =
        helpers::post_json(&app, &admin, &format!("/api/tags/{tag_id}/assign"), target.clone())
            .await;
    assert_eq!(body["added"], false);

    let (_, body) = helpers::get_json(&app, &admin, "/api/companies?tag=hot").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["tags"], json!(["hot"]));

    let (_, body) = helpers::get_json(&app, &admin, &format!("/api/tags/{tag_id}")).await;
    assert_eq!(body["usage_count"], 1);

    let (status, _) =
        helpers::post_json(&app, &admin, &format!("/api/tags/{tag_id}/unassign"), target.clone())
            .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        helpers::post_json(&app, &admin, &format!("/api/tags/{tag_id}/unassign"), target).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = helpers::get_json(&app, &admin, "/api/companies?tag=hot").await;
    assert_eq!(body["total"], 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn tag_assign_checks_target(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let (_, tag) = helpers::post_json(&app, &admin, "/api/tags", json!({ "name": "vip" })).await;
    let tag_id = helpers::id_of(&tag);

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        &format!("/api/tags/{tag_id}/assign"),
        json!({ "entity_type": "contact", "entity_id": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "contact not found");

    let (status, _) = helpers::post_json(
        &app,
        &admin,
        &format!("/api/tags/{tag_id}/assign"),
        json!({ "entity_type": "planet", "entity_id": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_tag_name_conflicts(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    helpers::post_json(&app, &admin, "/api/tags", json!({ "name": "referral" })).await;
    let (status, _) =
        helpers::post_json(&app, &admin, "/api/tags", json!({ "name": "referral" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = helpers::post_json(
        &app,
        &admin,
        "/api/tags",
        json!({ "name": "colorful", "color": "red" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ---------------------------------------------------------------------------
// Lenders and products
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn lender_amount_range_validated(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        "/api/lenders",
        json!({ "name": "Upside Down Bank", "min_amount": 500_000, "max_amount": 10_000 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"][0], "amount: minimum must not exceed maximum");

    let id = create_lender(
        &app,
        &admin,
        json!({ "name": "Summit Capital", "min_amount": 10_000, "max_amount": 500_000 }),
    )
    .await;

    // A partial update is checked against the stored bound.
    let (status, _) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/lenders/{id}"),
        json!({ "min_amount": 600_000 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/lenders/{id}"),
        json!({ "min_amount": 25_000 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["min_amount"], 25_000);
    assert_eq!(body["max_amount"], 500_000);
}

#[sqlx::test(migrations = "./migrations")]
async fn lender_delete_needs_management(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let (_, staff) = helpers::create_user(&app, &admin, "staff", "s@portal.test").await;

    let id = create_lender(&app, &staff, json!({ "name": "Quarry Funding" })).await;

    let (status, _) = helpers::delete_json(&app, &staff, &format!("/api/lenders/{id}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = helpers::delete_json(&app, &admin, &format!("/api/lenders/{id}")).await;
    assert_eq!(status, StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
async fn products_belong_to_lender(pool: PgPool) {
    let state = helpers::test_state(pool).await;
    let app = helpers::test_router(state);
    let admin = helpers::admin_login(&app).await;
    let lender_id = create_lender(&app, &admin, json!({ "name": "Keystone Lending" })).await;

    let (status, body) = helpers::post_json(&app, &admin, "/api/products", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["fields"],
        json!(["lender_id is required", "name is required"])
    );

    let (status, body) = helpers::post_json(
        &app,
        &admin,
        "/api/products",
        json!({
            "lender_id": lender_id,
            "name": "Equipment Loan",
            "category": "equipment",
            "min_amount": 20_000,
            "max_amount": 2_000_000,
            "min_rate_bps": 650,
            "max_rate_bps": 1_800,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["lender_name"], "Keystone Lending");
    let product_id = helpers::id_of(&body);

    let (status, _) = helpers::put_json(
        &app,
        &admin,
        &format!("/api/products/{product_id}"),
        json!({ "max_rate_bps": 500 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = helpers::get_json(&app, &admin, "/api/products?amount=50000").await;
    assert_eq!(body["total"], 1);
    let (_, body) = helpers::get_json(&app, &admin, "/api/products?amount=5000").await;
    assert_eq!(body["total"], 0);

    let (_, body) = helpers::get_json(&app, &admin, &format!("/api/lenders/{lender_id}")).await;
    assert_eq!(body["product_count"], 1);
}
