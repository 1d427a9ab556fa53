mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use common::{pickup_checkout, TestApp};
use stocksmart_api::{app_router, services::PaymentOutcome};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_and_readiness_respond() {
    let app = TestApp::new().await;
    let router = app_router(app.state.clone());

    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn product_listing_only_shows_active_products() {
    let app = TestApp::new().await;
    app.seed_product("Visible", 5_000, 0, 3).await;
    let router = app_router(app.state.clone());

    let response = router
        .clone()
        .oneshot(Request::get("/api/v1/products").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["name"], "Visible");

    let response = router
        .oneshot(
            Request::get("/api/v1/products/no-such-product")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn cart_round_trip_over_http() {
    let app = TestApp::new().await;
    let product = app.seed_product("Llave Inglesa", 12_990, 0, 8).await;
    let router = app_router(app.state.clone());

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/v1/carts")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"visitor_id":"v-http"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cart = body_json(response).await;
    let cart_id = cart["cart"]["id"].as_str().unwrap().to_string();

    let payload = format!(r#"{{"product_id":"{}","quantity":2}}"#, product.id);
    let response = router
        .oneshot(
            Request::post(format!("/api/v1/carts/{cart_id}/items"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["subtotal"], 25_980);
    assert_eq!(body["item_count"], 2);
}

#[tokio::test]
async fn visitor_tokens_up_to_64_chars_are_accepted() {
    let app = TestApp::new().await;
    let router = app_router(app.state.clone());

    // Longest token the resolve endpoint admits; the carts.visitor_id
    // column must hold it without truncation.
    let token = "v".repeat(64);
    let response = router
        .oneshot(
            Request::post("/api/v1/carts")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(format!(r#"{{"visitor_id":"{token}"}}"#)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cart = body_json(response).await;
    assert_eq!(cart["cart"]["visitor_id"].as_str().unwrap(), token);
}

#[tokio::test]
async fn webhook_acks_duplicates_with_success() {
    let app = TestApp::new().await;
    let product = app.seed_product("Compresor", 159_990, 0, 2).await;
    let order = app
        .state
        .services
        .checkout
        .buy_now(product.id, 1, pickup_checkout("web@example.cl"))
        .await
        .unwrap();
    app.state
        .services
        .payments
        .start_payment(&order.order_number)
        .await
        .unwrap();
    app.gateway.set_outcome(PaymentOutcome::Confirmed).await;

    let router = app_router(app.state.clone());
    let form = format!("token={}", app.gateway.token);

    let first = router
        .clone()
        .oneshot(
            Request::post("/api/v1/payments/flow/confirm")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = body_json(first).await;
    assert_eq!(body["applied"], true);
    assert_eq!(body["status"], "paid");

    // The retry must also be a 2xx so the gateway stops redelivering.
    let second = router
        .oneshot(
            Request::post("/api/v1/payments/flow/confirm")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_json(second).await;
    assert_eq!(body["applied"], false);
    assert_eq!(body["status"], "paid");
}

#[tokio::test]
async fn unknown_webhook_token_is_not_acked() {
    let app = TestApp::new().await;
    app.gateway.set_outcome(PaymentOutcome::Confirmed).await;
    let router = app_router(app.state.clone());

    let response = router
        .oneshot(
            Request::post("/api/v1/payments/flow/confirm")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("token=tok-forged"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
