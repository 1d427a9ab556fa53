use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, success_response},
    services::NewCredentials,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/carts/sweep", post(sweep_carts))
        .route("/admin/flow-credentials", get(list_credentials))
        .route("/admin/flow-credentials", post(create_credentials))
        .route(
            "/admin/flow-credentials/{id}/activate",
            post(activate_credentials),
        )
}

async fn sweep_carts(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let swept = state
        .services
        .carts
        .sweep_stale_guest_carts(state.config.cart_max_idle_days)
        .await?;
    Ok(success_response(json!({ "deactivated": swept })))
}

async fn list_credentials(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let credentials = state.services.credentials.list().await?;
    Ok(success_response(credentials))
}

async fn create_credentials(
    State(state): State<AppState>,
    Json(payload): Json<NewCredentials>,
) -> Result<Response, ServiceError> {
    let created = state.services.credentials.create(payload).await?;
    Ok(created_response(created))
}

async fn activate_credentials(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let activated = state.services.credentials.activate(id).await?;
    Ok(success_response(activated))
}
