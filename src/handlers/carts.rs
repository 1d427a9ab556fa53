use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    handlers::common::{success_response, validate_input},
    services::CartOwner,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/carts", post(resolve_cart))
        .route("/carts/{id}", get(get_cart))
        .route("/carts/{id}/items", post(add_item))
        .route("/carts/{id}/items/{item_id}", put(update_item))
        .route("/carts/{id}/items/{item_id}", delete(remove_item))
        .route("/carts/{id}/clear", post(clear_cart))
}

/// Identifies the cart owner: a logged-in customer or an anonymous
/// visitor cookie. Exactly one must be supplied.
#[derive(Debug, Deserialize, Validate)]
struct ResolveCartRequest {
    customer_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    visitor_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct AddItemRequest {
    product_id: Uuid,
    #[validate(range(min = 1))]
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct UpdateItemRequest {
    quantity: i32,
}

async fn resolve_cart(
    State(state): State<AppState>,
    Json(payload): Json<ResolveCartRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let owner = match (payload.customer_id, payload.visitor_id) {
        (Some(customer), None) => CartOwner::Customer(customer),
        (None, Some(visitor)) => CartOwner::Visitor(visitor),
        _ => {
            return Err(ServiceError::ValidationError(
                "provide exactly one of customer_id or visitor_id".to_string(),
            ))
        }
    };
    let cart = state.services.carts.active_cart_for(owner).await?;
    let detail = state.services.carts.get_cart(cart.id).await?;
    Ok(success_response(detail))
}

async fn get_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.get_cart(id).await?;
    Ok(success_response(cart))
}

async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .carts
        .add_item(id, payload.product_id, payload.quantity)
        .await?;
    Ok(success_response(cart))
}

async fn update_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<Response, ServiceError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(id, item_id, payload.quantity)
        .await?;
    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ServiceError> {
    // Quantity zero deletes the line.
    let cart = state
        .services
        .carts
        .update_item_quantity(id, item_id, 0)
        .await?;
    Ok(success_response(cart))
}

async fn clear_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.carts.clear_cart(id).await?;
    let cart = state.services.carts.get_cart(id).await?;
    Ok(success_response(cart))
}
