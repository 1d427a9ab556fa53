use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Router,
};

use crate::{
    errors::ServiceError,
    handlers::common::{success_response, PaginatedResponse},
    services::ProductFilter,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/{slug}", get(get_product))
        .route("/categories", get(list_categories))
        .route("/brands", get(list_brands))
}

async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Response, ServiceError> {
    let page = filter.page.unwrap_or(1).max(1);
    let per_page = filter.per_page.unwrap_or(24).clamp(1, 100);
    let (products, total) = state.services.catalog.list_products(filter).await?;
    Ok(success_response(PaginatedResponse::new(
        products, page, per_page, total,
    )))
}

async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.get_product(&slug).await?;
    Ok(success_response(product))
}

async fn list_categories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(success_response(categories))
}

async fn list_brands(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let brands = state.services.catalog.list_brands().await?;
    Ok(success_response(brands))
}
