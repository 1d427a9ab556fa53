use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Flow gateway hosts, switched by the active credential set's environment.
pub const FLOW_SANDBOX_BASE_URL: &str = "https://sandbox.flow.cl/api";
pub const FLOW_PRODUCTION_BASE_URL: &str = "https://www.flow.cl/api";

/// Application configuration, loaded from `config/default.toml` (optional)
/// layered with `APP_*` environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Database connection URL (postgres or sqlite).
    pub database_url: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Run migrations on startup.
    #[serde(default)]
    pub auto_migrate: bool,

    /// Public base URL of this service, used to build gateway callback URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Flat carrier shipping rate in pesos; pickup is always free.
    #[serde(default = "default_carrier_shipping_cost")]
    pub carrier_shipping_cost: i64,

    /// Days of inactivity after which guest carts are swept.
    #[serde(default = "default_cart_max_idle_days")]
    pub cart_max_idle_days: i64,

    /// Outbound gateway call timeout in seconds.
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    /// Fallback Flow credentials used when no credential row is active.
    #[serde(default)]
    pub flow_api_key: Option<String>,
    #[serde(default)]
    pub flow_secret_key: Option<String>,
    #[serde(default = "default_true")]
    pub flow_sandbox: bool,
    /// Overrides the Flow API host entirely; wins over the sandbox switch.
    #[serde(default)]
    pub flow_base_url: Option<String>,

    /// MercadoPago access token for the secondary adapter.
    #[serde(default)]
    pub mercadopago_access_token: Option<String>,

    #[serde(default)]
    pub db_max_connections: Option<u32>,
}

impl AppConfig {
    pub fn confirmation_url(&self) -> String {
        format!("{}/api/v1/payments/flow/confirm", self.public_base_url)
    }

    pub fn return_url(&self) -> String {
        format!("{}/api/v1/payments/flow/return", self.public_base_url)
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_public_base_url() -> String {
    format!("http://localhost:{}", DEFAULT_PORT)
}
fn default_carrier_shipping_cost() -> i64 {
    3_990
}
fn default_cart_max_idle_days() -> i64 {
    30
}
fn default_gateway_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

/// Loads configuration from the optional config file and the environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .set_default("database_url", "sqlite::memory:")?;

    let default_file = Path::new(CONFIG_DIR).join("default.toml");
    if default_file.exists() {
        builder = builder.add_source(File::from(default_file));
    }

    builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()
}

/// Installs the global tracing subscriber.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stocksmart_api={log_level},tower_http=info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_urls_are_built_from_public_base() {
        let cfg = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            auto_migrate: false,
            public_base_url: "https://tienda.example.cl".to_string(),
            carrier_shipping_cost: default_carrier_shipping_cost(),
            cart_max_idle_days: default_cart_max_idle_days(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            flow_api_key: None,
            flow_secret_key: None,
            flow_sandbox: true,
            flow_base_url: None,
            mercadopago_access_token: None,
            db_max_connections: None,
        };
        assert_eq!(
            cfg.confirmation_url(),
            "https://tienda.example.cl/api/v1/payments/flow/confirm"
        );
        assert_eq!(
            cfg.return_url(),
            "https://tienda.example.cl/api/v1/payments/flow/return"
        );
    }
}
