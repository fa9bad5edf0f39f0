use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection string. When absent the service runs on the
    /// in-memory store.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// How long a checkout may sit on held seats before they lapse.
    pub seat_hold_seconds: u64,
    /// Cadence of the background reconciliation worker.
    pub sweep_interval_seconds: u64,
    /// Pending orders older than this are treated as dead checkouts.
    pub stale_order_seconds: u64,
    pub currency: String,
    #[serde(default = "default_premium_multiplier")]
    pub premium_fare_multiplier: f64,
}

fn default_premium_multiplier() -> f64 {
    1.5
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific file, optional.
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // FAREBOX__SERVER__PORT=8081 etc.
            .add_source(config::Environment::with_prefix("FAREBOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
