use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::{
    config::AppConfig,
    entities::{order, order_item, Order, OrderItem},
    errors::ServiceError,
};

const PREFERENCE_URL: &str = "https://api.mercadopago.com/checkout/preferences";

/// Secondary checkout path: builds a MercadoPago preference for an order
/// and hands back the hosted-checkout redirect. Unlike the Flow path there
/// is no token reconciliation here; the preference carries the order
/// number as external reference for manual matching.
#[derive(Clone)]
pub struct MercadoPagoService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedPreference {
    pub preference_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
    sandbox_init_point: Option<String>,
}

impl MercadoPagoService {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .map_err(|e| ServiceError::GatewayError(format!("http client init failed: {e}")))?;
        Ok(Self { db, config, client })
    }

    #[instrument(skip(self))]
    pub async fn create_preference(
        &self,
        order_number: &str,
    ) -> Result<CreatedPreference, ServiceError> {
        let token = self
            .config
            .mercadopago_access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServiceError::GatewayError("MercadoPago access token is not configured".to_string())
            })?;

        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;
        if order.status != order::OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is not awaiting payment",
                order.order_number
            )));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;

        let item_payload: Vec<serde_json::Value> = items
            .iter()
            .map(|line| {
                json!({
                    "title": line.product_name,
                    "quantity": line.quantity,
                    "currency_id": "CLP",
                    "unit_price": line.unit_price,
                })
            })
            .collect();

        let base = self.config.public_base_url.trim_end_matches('/');
        let body = json!({
            "items": item_payload,
            "back_urls": {
                "success": format!("{base}/api/v1/payments/mercadopago/success"),
                "failure": format!("{base}/api/v1/payments/mercadopago/failure"),
                "pending": format!("{base}/api/v1/payments/mercadopago/pending"),
            },
            "auto_return": "approved",
            "external_reference": order.order_number,
        });

        let response = self
            .client
            .post(PREFERENCE_URL)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("MercadoPago request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayError(format!(
                "MercadoPago returned {status}: {detail}"
            )));
        }

        let preference: PreferenceResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("malformed preference response: {e}")))?;

        let redirect_url = if self.config.flow_sandbox {
            preference
                .sandbox_init_point
                .unwrap_or(preference.init_point)
        } else {
            preference.init_point
        };

        info!(
            "created MercadoPago preference {} for order {}",
            preference.id, order.order_number
        );
        Ok(CreatedPreference {
            preference_id: preference.id,
            redirect_url,
        })
    }
}
