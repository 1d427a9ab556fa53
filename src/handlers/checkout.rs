use axum::{extract::State, response::Response, routing::post, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::created_response,
    services::CheckoutInput,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout_cart))
        .route("/checkout/buy-now", post(buy_now))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    cart_id: Uuid,
    #[serde(flatten)]
    input: CheckoutInput,
}

#[derive(Debug, Deserialize)]
struct BuyNowRequest {
    product_id: Uuid,
    quantity: i32,
    #[serde(flatten)]
    input: CheckoutInput,
}

async fn checkout_cart(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .checkout
        .place_order(payload.cart_id, payload.input)
        .await?;
    Ok(created_response(order))
}

async fn buy_now(
    State(state): State<AppState>,
    Json(payload): Json<BuyNowRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .checkout
        .buy_now(payload.product_id, payload.quantity, payload.input)
        .await?;
    Ok(created_response(order))
}
