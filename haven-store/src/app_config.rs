use std::env;
use std::path::PathBuf;

use haven_order::engine::{DEFAULT_GRACE_PERIOD_SECONDS, DEFAULT_NIGHT_SECONDS};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Refundable deposit in the ledger's smallest unit. Leaving it unset
    /// disables order creation until it is configured.
    pub holding_fee: Option<u64>,
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
    /// Real seconds per reserved night; production runs a full day, test
    /// deployments compress this.
    #[serde(default = "default_night_seconds")]
    pub night_seconds: u64,
}

fn default_grace_period() -> u64 {
    DEFAULT_GRACE_PERIOD_SECONDS
}

fn default_night_seconds() -> u64 {
    DEFAULT_NIGHT_SECONDS
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Base URL of the ledger gateway.
    pub gateway_url: String,
    /// Ledger account guest payments must be addressed to.
    pub service_account: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory for the region snapshot files. Unset runs fully in memory.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of HAVEN)
            .add_source(config::Environment::with_prefix("HAVEN").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
