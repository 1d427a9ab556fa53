use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use tokio::sync::Mutex;
use uuid::Uuid;

use migrations::{Migrator, MigratorTrait};
use stocksmart_api::{
    config::AppConfig,
    entities::{product, ProductModel},
    errors::ServiceError,
    events,
    services::{
        flow::{CreatePaymentRequest, CreatedPayment},
        CheckoutInput, PaymentGateway, PaymentOutcome,
    },
    AppState,
};
use stocksmart_api::entities::order::{PaymentMethod, ShippingMethod};

/// Scriptable stand-in for the payment gateway. Hands out a fixed token
/// and reports whatever outcome the test sets.
pub struct MockGateway {
    pub token: String,
    outcome: Mutex<PaymentOutcome>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token: "tok-test-0001".to_string(),
            outcome: Mutex::new(PaymentOutcome::Pending),
        })
    }

    pub async fn set_outcome(&self, outcome: PaymentOutcome) {
        *self.outcome.lock().await = outcome;
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatedPayment, ServiceError> {
        Ok(CreatedPayment {
            token: self.token.clone(),
            redirect_url: format!(
                "https://pay.test/order/{}?token={}",
                request.commerce_order, self.token
            ),
        })
    }

    async fn payment_status(&self, _token: &str) -> Result<PaymentOutcome, ServiceError> {
        Ok(*self.outcome.lock().await)
    }
}

pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Arc::new(in_memory_db().await);
        Migrator::up(db.as_ref(), None)
            .await
            .expect("migrations apply cleanly");

        let (sender, mut receiver) = events::channel(64);
        // Drain events so senders never block on a full channel.
        tokio::spawn(async move { while receiver.recv().await.is_some() {} });

        let gateway = MockGateway::new();
        let state = AppState::with_gateway(
            db,
            Arc::new(test_config()),
            Arc::new(sender),
            gateway.clone(),
        )
        .unwrap();
        Self { state, gateway }
    }

    pub async fn seed_product(&self, name: &str, price: i64, discount: i32, stock: i32) -> ProductModel {
        let slug = name.to_lowercase().replace(' ', "-");
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            slug: Set(slug),
            description: Set(None),
            published_price: Set(price),
            discount_percentage: Set(discount),
            category_id: Set(None),
            brand_id: Set(None),
            stock: Set(stock),
            is_active: Set(true),
            is_featured: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        model
            .insert(self.state.db.as_ref())
            .await
            .expect("product inserts")
    }
}

// A single connection keeps every query on the same in-memory database.
async fn in_memory_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options.max_connections(1).sqlx_logging(false);
    Database::connect(options)
        .await
        .expect("in-memory database opens")
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        log_level: "warn".to_string(),
        auto_migrate: false,
        public_base_url: "http://localhost:8080".to_string(),
        carrier_shipping_cost: 3990,
        cart_max_idle_days: 30,
        gateway_timeout_secs: 5,
        flow_api_key: Some("test-api-key".to_string()),
        flow_secret_key: Some("test-secret".to_string()),
        flow_sandbox: true,
        flow_base_url: None,
        mercadopago_access_token: None,
        db_max_connections: Some(1),
    }
}

pub fn pickup_checkout(email: &str) -> CheckoutInput {
    CheckoutInput {
        customer_name: "Ana Rojas".to_string(),
        customer_email: email.to_string(),
        customer_phone: "+56911111111".to_string(),
        shipping_method: ShippingMethod::Pickup,
        payment_method: PaymentMethod::Flow,
        region: None,
        city: None,
        commune: None,
        shipping_address: None,
        notes: None,
    }
}
