use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, instrument, warn};

use crate::{
    config::{AppConfig, FLOW_PRODUCTION_BASE_URL, FLOW_SANDBOX_BASE_URL},
    entities::{flow_credentials, FlowCredentials},
    errors::ServiceError,
};

type HmacSha256 = Hmac<Sha256>;

/// Signs a gateway parameter set: parameters are sorted by key name
/// ascending, concatenated as `key || value`, and HMAC-SHA256'd with the
/// account secret. The hex digest travels as the `s` parameter.
pub fn sign(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);

    let to_sign: String = sorted
        .iter()
        .map(|(k, v)| format!("{k}{v}"))
        .collect();

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(to_sign.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// What the gateway reports for a payment, after the adapter has mapped
/// the raw status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Code 2: payment completed.
    Confirmed,
    /// Codes 3 (rejected) and 4 (annulled): definitive failure.
    Rejected,
    /// Code 1 or anything unrecognized: still in flight, safe to retry.
    Pending,
}

impl PaymentOutcome {
    pub fn from_status_code(code: i32) -> Self {
        match code {
            2 => Self::Confirmed,
            3 | 4 => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

/// Request to open a payment at the gateway.
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub commerce_order: String,
    pub subject: String,
    pub amount: i64,
    pub payer_email: String,
}

/// A successfully created remote payment.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub token: String,
    pub redirect_url: String,
}

/// Seam for the external payment gateway, so reconciliation can be
/// exercised without network access.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatedPayment, ServiceError>;

    /// Re-derives the authoritative payment outcome from the gateway's
    /// signed status endpoint. Callback bodies are never trusted.
    async fn payment_status(&self, token: &str) -> Result<PaymentOutcome, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct FlowCreateResponse {
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct FlowStatusResponse {
    status: i32,
}

struct ResolvedCredentials {
    api_key: String,
    secret_key: String,
    base_url: String,
}

/// Flow payment gateway client. Credentials come from the single active
/// `flow_credentials` row, falling back to configuration.
pub struct FlowGateway {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    client: reqwest::Client,
}

impl FlowGateway {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .map_err(|e| ServiceError::GatewayError(format!("http client init failed: {e}")))?;
        Ok(Self { db, config, client })
    }

    fn base_url(&self, sandbox: bool) -> String {
        if let Some(url) = &self.config.flow_base_url {
            return url.trim_end_matches('/').to_string();
        }
        if sandbox {
            FLOW_SANDBOX_BASE_URL.to_string()
        } else {
            FLOW_PRODUCTION_BASE_URL.to_string()
        }
    }

    async fn credentials(&self) -> Result<ResolvedCredentials, ServiceError> {
        let active = FlowCredentials::find()
            .filter(flow_credentials::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;

        if let Some(row) = active {
            return Ok(ResolvedCredentials {
                base_url: self.base_url(row.is_sandbox),
                api_key: row.api_key,
                secret_key: row.secret_key,
            });
        }

        match (&self.config.flow_api_key, &self.config.flow_secret_key) {
            (Some(api_key), Some(secret_key)) => Ok(ResolvedCredentials {
                api_key: api_key.clone(),
                secret_key: secret_key.clone(),
                base_url: self.base_url(self.config.flow_sandbox),
            }),
            _ => Err(ServiceError::GatewayError(
                "no active gateway credentials".to_string(),
            )),
        }
    }
}

#[async_trait]
impl PaymentGateway for FlowGateway {
    #[instrument(skip(self, request), fields(commerce_order = %request.commerce_order))]
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatedPayment, ServiceError> {
        let creds = self.credentials().await?;
        let amount = request.amount.to_string();
        let url_confirmation = self.config.confirmation_url();
        let url_return = self.config.return_url();

        let params: Vec<(&str, &str)> = vec![
            ("apiKey", &creds.api_key),
            ("commerceOrder", &request.commerce_order),
            ("subject", &request.subject),
            ("currency", "CLP"),
            ("amount", &amount),
            ("email", &request.payer_email),
            ("urlConfirmation", &url_confirmation),
            ("urlReturn", &url_return),
        ];
        let signature = sign(&params, &creds.secret_key);

        let mut form: Vec<(&str, &str)> = params.clone();
        form.push(("s", &signature));

        let response = self
            .client
            .post(format!("{}/payment/create", creds.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!("gateway unreachable: {e}");
                ServiceError::GatewayError(format!("payment/create transport failure: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!("payment/create returned HTTP {status}");
            return Err(ServiceError::GatewayError(format!(
                "payment/create returned HTTP {status}"
            )));
        }

        let body: FlowCreateResponse = response.json().await.map_err(|e| {
            error!("malformed payment/create response: {e}");
            ServiceError::GatewayError(format!("malformed payment/create response: {e}"))
        })?;

        Ok(CreatedPayment {
            redirect_url: format!("{}?token={}", body.url, body.token),
            token: body.token,
        })
    }

    #[instrument(skip(self))]
    async fn payment_status(&self, token: &str) -> Result<PaymentOutcome, ServiceError> {
        let creds = self.credentials().await?;

        let params: Vec<(&str, &str)> = vec![("apiKey", &creds.api_key), ("token", token)];
        let signature = sign(&params, &creds.secret_key);

        let mut query = params.clone();
        query.push(("s", &signature));

        let response = self
            .client
            .get(format!("{}/payment/getStatus", creds.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                warn!("gateway unreachable: {e}");
                ServiceError::GatewayError(format!("payment/getStatus transport failure: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ServiceError::GatewayError(format!(
                "payment/getStatus returned HTTP {status}"
            )));
        }

        let body: FlowStatusResponse = response.json().await.map_err(|e| {
            ServiceError::GatewayError(format!("malformed payment/getStatus response: {e}"))
        })?;

        Ok(PaymentOutcome::from_status_code(body.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn signature_is_deterministic() {
        let params = [
            ("amount", "1000"),
            ("apiKey", "K"),
            ("commerceOrder", "ORD-1"),
        ];
        let a = sign(&params, SECRET);
        let b = sign(&params, SECRET);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let forward = [
            ("amount", "1000"),
            ("apiKey", "K"),
            ("commerceOrder", "ORD-1"),
        ];
        let shuffled = [
            ("commerceOrder", "ORD-1"),
            ("amount", "1000"),
            ("apiKey", "K"),
        ];
        assert_eq!(sign(&forward, SECRET), sign(&shuffled, SECRET));
    }

    #[test]
    fn altering_any_value_changes_the_signature() {
        let base = [
            ("amount", "1000"),
            ("apiKey", "K"),
            ("commerceOrder", "ORD-1"),
        ];
        let reference = sign(&base, SECRET);

        let tampered_amount = [
            ("amount", "1001"),
            ("apiKey", "K"),
            ("commerceOrder", "ORD-1"),
        ];
        let tampered_order = [
            ("amount", "1000"),
            ("apiKey", "K"),
            ("commerceOrder", "ORD-2"),
        ];
        assert_ne!(reference, sign(&tampered_amount, SECRET));
        assert_ne!(reference, sign(&tampered_order, SECRET));
    }

    #[test]
    fn different_secret_changes_the_signature() {
        let params = [("apiKey", "K"), ("token", "tok")];
        assert_ne!(sign(&params, "a"), sign(&params, "b"));
    }

    #[test]
    fn status_codes_map_to_outcomes() {
        assert_eq!(PaymentOutcome::from_status_code(2), PaymentOutcome::Confirmed);
        assert_eq!(PaymentOutcome::from_status_code(3), PaymentOutcome::Rejected);
        assert_eq!(PaymentOutcome::from_status_code(4), PaymentOutcome::Rejected);
        assert_eq!(PaymentOutcome::from_status_code(1), PaymentOutcome::Pending);
        assert_eq!(PaymentOutcome::from_status_code(0), PaymentOutcome::Pending);
        assert_eq!(PaymentOutcome::from_status_code(99), PaymentOutcome::Pending);
    }
}
