pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    config::AppConfig,
    errors::ServiceError,
    events::EventSender,
    services::{
        CartService, CatalogService, CheckoutService, CredentialService, FlowGateway,
        MercadoPagoService, OrderService, PaymentGateway, PaymentService, ReconciliationService,
    },
};

/// All service instances, built once at startup and shared through the
/// router state.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub reconciliation: ReconciliationService,
    pub orders: OrderService,
    pub credentials: CredentialService,
    pub mercadopago: MercadoPagoService,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
}

impl AppState {
    /// Wires the default service graph against the live payment gateway.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self, ServiceError> {
        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(FlowGateway::new(db.clone(), config.clone())?);
        Self::with_gateway(db, config, event_sender, gateway)
    }

    /// Same wiring with the gateway seam swappable, for test harnesses.
    pub fn with_gateway(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, ServiceError> {
        let services = AppServices {
            catalog: CatalogService::new(db.clone()),
            carts: CartService::new(db.clone(), event_sender.clone()),
            checkout: CheckoutService::new(db.clone(), event_sender.clone(), config.clone()),
            payments: PaymentService::new(db.clone(), gateway.clone(), event_sender.clone()),
            reconciliation: ReconciliationService::new(
                db.clone(),
                gateway,
                event_sender.clone(),
            ),
            orders: OrderService::new(db.clone(), event_sender.clone()),
            credentials: CredentialService::new(db.clone()),
            mercadopago: MercadoPagoService::new(db.clone(), config.clone())?,
        };
        Ok(Self {
            db,
            config,
            event_sender,
            services,
        })
    }
}

/// Builds the full application router with its middleware stack.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::health::router())
        .nest("/api/v1", handlers::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
