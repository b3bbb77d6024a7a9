//! HTTP 路由冒烟测试 (tower oneshot，不开端口)

mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use common::*;
use order_server::api;
use order_server::platforms::foodpanda;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app_router(app: &TestApp) -> Router {
    api::build_app().with_state(app.state.clone())
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let (status, body) = send(
        app_router(&app),
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"]["status"], "ok");
}

#[tokio::test]
async fn test_place_and_cancel_over_http() {
    let app = setup().await;
    let (status, body) = send(
        app_router(&app),
        post_json(
            "/api/orders",
            &json!({
                "brandId": BRAND_ID,
                "storeId": STORE_ID,
                "orderType": "takeout",
                "items": [{"itemType": "dish", "templateId": BEEF_NOODLES, "quantity": 2}],
                "paymentMethod": "cash"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let order_id = body["order"]["id"].as_i64().expect("order id");
    assert_eq!(stock_of(app.pool(), BEEF_NOODLES).await, 8);

    let (status, body) = send(
        app_router(&app),
        post_json(
            &format!("/api/orders/{order_id}/cancel"),
            &json!({"reason": "wrong table", "actor": "cashier"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(stock_of(app.pool(), BEEF_NOODLES).await, 10);

    // 重复取消是冲突
    let (status, _) = send(
        app_router(&app),
        post_json(
            &format!("/api/orders/{order_id}/cancel"),
            &json!({"reason": "again", "actor": "cashier"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_out_of_stock_is_conflict() {
    let app = setup().await;
    let (status, body) = send(
        app_router(&app),
        post_json(
            "/api/orders",
            &json!({
                "brandId": BRAND_ID,
                "storeId": STORE_ID,
                "orderType": "takeout",
                "items": [{"itemType": "dish", "templateId": PORK_RICE, "quantity": 5}],
                "paymentMethod": "card"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(body["message"].as_str().unwrap_or_default().contains("only 2 left"), "{body}");
    assert_eq!(order_count(app.pool()).await, 0);
}

#[tokio::test]
async fn test_webhook_signature_checked() {
    let app = setup().await;
    let body = foodpanda_order("fp-http", json!([{
        "remoteCode": "beef-1", "name": "Beef Noodle Soup", "quantity": 1, "unitPrice": "120.00"
    }]));

    let forged = Request::post("/api/webhooks/foodpanda")
        .header(foodpanda::SIGNATURE_HEADER, "00ff")
        .body(Body::from(body.clone()))
        .unwrap();
    let (status, _) = send(app_router(&app), forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let signed = signed_headers(foodpanda::SIGNATURE_HEADER, &body);
    let mut request = Request::post("/api/webhooks/foodpanda")
        .body(Body::from(body))
        .unwrap();
    request.headers_mut().extend(signed);
    let (status, outcome) = send(app_router(&app), request).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["outcome"], "created");

    let unknown = Request::post("/api/webhooks/doordash")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(app_router(&app), unknown).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inventory_adjust_and_log() {
    let app = setup().await;
    let (status, body) = send(
        app_router(&app),
        post_json(
            &format!("/api/inventory/{STORE_ID}/items/{PORK_RICE}/adjust"),
            &json!({"kind": "add", "quantity": 5, "reason": "delivery", "operator": "amy"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(stock_of(app.pool(), PORK_RICE).await, 7);

    let (status, body) = send(
        app_router(&app),
        Request::get(format!("/api/inventory/{STORE_ID}/items/{PORK_RICE}/log"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}
