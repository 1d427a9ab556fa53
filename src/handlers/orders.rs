use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    handlers::common::{success_response, PaginatedResponse, PaginationParams},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{order_number}", get(get_order))
        .route("/orders/{order_number}/cancel", post(cancel_order))
        .route("/orders/{order_number}/status", post(set_status))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    note: Option<String>,
}

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "paid" => Ok(OrderStatus::Paid),
        "shipped" => Ok(OrderStatus::Shipped),
        "delivered" => Ok(OrderStatus::Delivered),
        "failed" => Ok(OrderStatus::Failed),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        other => Err(ServiceError::ValidationError(format!(
            "Unknown order status: {other}"
        ))),
    }
}

async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list(params.page, params.per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        orders,
        params.page,
        params.per_page,
        total,
    )))
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Response, ServiceError> {
    let detail = state.services.orders.get_by_number(&order_number).await?;
    Ok(success_response(detail))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Response, ServiceError> {
    let note = payload.and_then(|Json(p)| p.note);
    let order = state.services.orders.cancel(&order_number, note).await?;
    Ok(success_response(order))
}

async fn set_status(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    Json(payload): Json<StatusRequest>,
) -> Result<Response, ServiceError> {
    let status = parse_status(&payload.status)?;
    let order = state
        .services
        .orders
        .advance_status(&order_number, status, payload.note)
        .await?;
    Ok(success_response(order))
}
