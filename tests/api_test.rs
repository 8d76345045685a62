mod common;

use std::str::FromStr;

use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

fn id_of(body: &Value) -> String {
    body["data"]["id"].as_str().expect("id").to_string()
}

#[tokio::test]
async fn status_and_health_are_public() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["service"], "backoffice-ledger");

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["checks"]["database"], "healthy");
}

#[tokio::test]
async fn mutations_require_an_actor() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/leads",
            Some(json!({ "full_name": "No Identity" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn production_round_trip_over_http() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/raw-materials",
            Some(json!({ "name": "Cotton yarn", "unit": "kg", "opening_quantity": "10" })),
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let material_id = id_of(&body_json(response).await);

    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Tote bag", "price": "12.50" })),
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let product_id = id_of(&body_json(response).await);

    let response = app
        .request(
            Method::POST,
            "/api/v1/manufacturing/logs",
            Some(json!({
                "product_id": product_id,
                "material_id": material_id,
                "quantity_used": "4",
                "manufactured_qty": "20"
            })),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let log_id = id_of(&body_json(response).await);

    let material = body_json(
        app.request(
            Method::GET,
            &format!("/api/v1/raw-materials/{material_id}"),
            None,
            Some(&app.staff),
        )
        .await,
    )
    .await;
    assert_eq!(decimal(&material["data"]["current_quantity"]), dec!(6));

    let response = app
        .request(
            Method::POST,
            "/api/v1/manufacturing/logs",
            Some(json!({
                "product_id": product_id,
                "material_id": material_id,
                "quantity_used": "7",
                "manufactured_qty": "1"
            })),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/manufacturing/logs/{log_id}/reverse"),
            None,
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/manufacturing/logs/{log_id}/reverse"),
            None,
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let log = body_json(
        app.request(
            Method::GET,
            &format!("/api/v1/manufacturing/logs/{log_id}"),
            None,
            Some(&app.staff),
        )
        .await,
    )
    .await;
    assert_eq!(log["data"]["reversed"], true);
    assert_eq!(log["data"]["id"], log_id.as_str());

    let logs = body_json(
        app.request(
            Method::GET,
            &format!("/api/v1/manufacturing/logs?product_id={product_id}"),
            None,
            Some(&app.staff),
        )
        .await,
    )
    .await;
    assert_eq!(logs["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn bad_input_and_missing_rows_map_to_statuses() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/manufacturing/logs",
            Some(json!({
                "product_id": Uuid::new_v4(),
                "material_id": Uuid::new_v4(),
                "quantity_used": "0",
                "manufactured_qty": "1"
            })),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/v1/manufacturing/logs",
            Some(json!({
                "product_id": Uuid::new_v4(),
                "material_id": Uuid::new_v4(),
                "quantity_used": "1",
                "manufactured_qty": "1"
            })),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/leads/{}", Uuid::new_v4()),
            None,
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn lead_conversion_over_http() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/leads",
            Some(json!({
                "full_name": "Priya Raman",
                "phone": "5550199",
                "company": "Raman Exports",
                "remark": "Inbound call"
            })),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let lead_id = id_of(&body);
    assert_eq!(body["data"]["lead_status"], "NEW");
    assert_eq!(body["data"]["assigned_to"], app.staff.id.to_string());

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/leads/{lead_id}"),
            Some(json!({ "converted": true, "remarks": "Signed PO" })),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["converted"], true);
    assert_eq!(body["data"]["remarks"].as_array().map(Vec::len), Some(2));

    let records = body_json(
        app.request(
            Method::GET,
            &format!("/api/v1/b2b?lead_id={lead_id}"),
            None,
            Some(&app.staff),
        )
        .await,
    )
    .await;
    let records = records["data"].as_array().expect("list").clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["order_status"], "OPEN");
    assert_eq!(records[0]["client_name"], "Priya Raman");
    assert_eq!(decimal(&records[0]["amount_pending"]), Decimal::ZERO);

    let outsider = backoffice_ledger::auth::Actor::staff(Uuid::new_v4());
    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/leads/{lead_id}"),
            Some(json!({ "lead_status": "LOST" })),
            Some(&outsider),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn client_supplied_pending_amount_is_ignored() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/b2b",
            Some(json!({
                "client_name": "Northwind Wholesale",
                "total_order_value": "1000",
                "amount_received": "400",
                "amount_pending": "1"
            })),
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let record_id = id_of(&body);
    assert_eq!(decimal(&body["data"]["amount_pending"]), dec!(600));
    assert_eq!(body["data"]["sr_no"], 1);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/b2b/{record_id}"),
            Some(json!({ "amount_received": "1000", "amount_pending": "999" })),
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(decimal(&body["data"]["amount_pending"]), Decimal::ZERO);

    // Staff did not convert this record
    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/b2b/{record_id}"),
            Some(json!({ "order_status": "CLOSED" })),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            "/api/v1/b2b",
            Some(json!({ "client_name": "Broken", "total_order_value": "-5" })),
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn retiring_a_material_blocks_production() {
    let app = TestApp::new().await;
    let material = app.seed_material("Beeswax", dec!(5)).await;
    let product = app.seed_product("Candle", dec!(0)).await;
    let uri = format!("/api/v1/raw-materials/{}", material.id);

    let response = app
        .request(Method::PATCH, &uri, Some(json!({ "is_active": false })), Some(&app.staff))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::PATCH, &uri, Some(json!({ "is_active": false })), Some(&app.manager))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["is_active"], false);

    let production = json!({
        "product_id": product.id,
        "material_id": material.id,
        "quantity_used": "1",
        "manufactured_qty": "1"
    });
    let response = app
        .request(
            Method::POST,
            "/api/v1/manufacturing/logs",
            Some(production.clone()),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let listed = body_json(
        app.request(Method::GET, "/api/v1/raw-materials", None, Some(&app.staff))
            .await,
    )
    .await;
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(0));

    let response = app
        .request(Method::PATCH, &uri, Some(json!({ "is_active": true })), Some(&app.manager))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .request(
            Method::POST,
            "/api/v1/manufacturing/logs",
            Some(production),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn retiring_a_product_blocks_production() {
    let app = TestApp::new().await;
    let material = app.seed_material("Clay", dec!(5)).await;
    let product = app.seed_product("Mug", dec!(0)).await;

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/products/{}", product.id),
            Some(json!({ "is_active": false })),
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/api/v1/manufacturing/logs",
            Some(json!({
                "product_id": product.id,
                "material_id": material.id,
                "quantity_used": "1",
                "manufactured_qty": "1"
            })),
            Some(&app.staff),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/products/{}", Uuid::new_v4()),
            Some(json!({ "is_active": true })),
            Some(&app.manager),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
