use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    errors::ServiceError,
    handlers::common::success_response,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{order_number}/pay", post(start_payment))
        .route("/payments/flow/return", get(flow_return_get))
        .route("/payments/flow/return", post(flow_return_post))
        .route("/payments/flow/confirm", post(flow_confirm))
        .route(
            "/payments/mercadopago/preference",
            post(mercadopago_preference),
        )
}

#[derive(Debug, Deserialize)]
struct TokenParams {
    token: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceRequest {
    order_number: String,
}

async fn start_payment(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Response, ServiceError> {
    let started = state.services.payments.start_payment(&order_number).await?;
    Ok(success_response(json!({
        "order_number": started.order.order_number,
        "redirect_url": started.redirect_url,
    })))
}

/// Browser return from the hosted payment page. The status shown here is
/// advisory; the webhook is the source of truth, but the same signed
/// re-query runs so a missed webhook still settles the order.
async fn flow_return_get(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
) -> Result<Response, ServiceError> {
    flow_return(state, params.token).await
}

async fn flow_return_post(
    State(state): State<AppState>,
    Form(params): Form<TokenParams>,
) -> Result<Response, ServiceError> {
    flow_return(state, params.token).await
}

async fn flow_return(state: AppState, token: String) -> Result<Response, ServiceError> {
    state.services.reconciliation.confirm(&token).await?;
    let detail = state.services.orders.get_by_token(&token).await?;
    Ok(success_response(detail))
}

/// Gateway webhook. Authenticity comes from the signed status re-query,
/// not from the caller. Any non-2xx here makes the gateway retry, so only
/// verification failures are surfaced as errors.
async fn flow_confirm(
    State(state): State<AppState>,
    Form(params): Form<TokenParams>,
) -> Result<Response, ServiceError> {
    let outcome = state.services.reconciliation.confirm(&params.token).await?;
    info!(
        applied = outcome.applied,
        order_number = %outcome.order.order_number,
        "payment confirmation processed"
    );
    Ok(success_response(json!({
        "order_number": outcome.order.order_number,
        "status": outcome.order.status.as_str(),
        "applied": outcome.applied,
    })))
}

async fn mercadopago_preference(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<PreferenceRequest>,
) -> Result<Response, ServiceError> {
    let preference = state
        .services
        .mercadopago
        .create_preference(&payload.order_number)
        .await?;
    Ok(success_response(preference))
}
