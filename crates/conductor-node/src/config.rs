//! Configuration for a Conductor node
//!
//! Loaded from environment variables. Invalid numbers are warned about and the
//! default is kept.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use conductor_cluster::DEFAULT_CHANNEL;
use conductor_monitoring::MonitoringConfig;

use crate::error::{NodeError, NodeResult};

/// Which document store a URL selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Process-local maps
    InMemory,
    /// PostgreSQL
    Postgres,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Document store URL (`memory://...` or `postgres://...`)
    pub store_url: String,

    /// PostgreSQL pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// PostgreSQL pool acquire timeout in seconds
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Redis URL; `None` runs a single node
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Shared pub/sub topic
    #[serde(default = "default_channel")]
    pub backplane_channel: String,

    /// Period of the full definition reload, 0 disables it
    #[serde(default = "default_sweep_secs")]
    pub definition_sweep_secs: u64,

    /// Log level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Rolling log file
    #[serde(default)]
    pub log_file: Option<String>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_sweep_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn parse_or_warn<T: FromStr>(name: &str, raw: &str, target: &mut T) {
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!("Invalid {} value: {}", name, raw),
    }
}

impl NodeConfig {
    /// Load configuration from environment variables
    pub fn load() -> NodeResult<Self> {
        Self::load_from(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which plays the role of the environment
    pub fn load_from<F>(lookup: F) -> NodeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CONDUCTOR_DB_URL").or_else(|| lookup("DBHOST")) {
            config.store_url = url;
        }

        if let Some(raw) = lookup("DB_MAX_CONNECTIONS") {
            parse_or_warn("DB_MAX_CONNECTIONS", &raw, &mut config.max_connections);
        }

        if let Some(raw) = lookup("DB_ACQUIRE_TIMEOUT_SECS") {
            parse_or_warn("DB_ACQUIRE_TIMEOUT_SECS", &raw, &mut config.acquire_timeout_secs);
        }

        config.redis_url = lookup("CONDUCTOR_REDIS_URL")
            .or_else(|| lookup("REDIS"))
            .filter(|url| !url.trim().is_empty());

        if let Some(channel) = lookup("BACKPLANE_CHANNEL") {
            if channel.trim().is_empty() {
                warn!("Empty BACKPLANE_CHANNEL ignored");
            } else {
                config.backplane_channel = channel;
            }
        }

        if let Some(raw) = lookup("DEFINITION_SWEEP_SECS") {
            parse_or_warn("DEFINITION_SWEEP_SECS", &raw, &mut config.definition_sweep_secs);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(raw) = lookup("LOG_JSON") {
            config.log_json = raw.eq_ignore_ascii_case("true") || raw == "1";
        }

        config.log_file = lookup("LOG_FILE").filter(|f| !f.is_empty());

        if config.store_url.is_empty() {
            return Err(NodeError::ConfigError(
                "Store URL is required (CONDUCTOR_DB_URL or DBHOST)".to_string(),
            ));
        }
        config.store_kind()?;

        info!("Loaded node configuration");
        Ok(config)
    }

    /// Store selected by `store_url`
    pub fn store_kind(&self) -> NodeResult<StoreKind> {
        if self.store_url.starts_with("memory://") {
            Ok(StoreKind::InMemory)
        } else if self.store_url.starts_with("postgres://")
            || self.store_url.starts_with("postgresql://")
        {
            Ok(StoreKind::Postgres)
        } else {
            Err(NodeError::ConfigError(format!(
                "Unsupported store URL: {}",
                self.store_url
            )))
        }
    }

    /// Sweep period, `None` when disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.definition_sweep_secs > 0).then(|| Duration::from_secs(self.definition_sweep_secs))
    }

    /// Logging settings derived from this configuration
    pub fn monitoring(&self) -> MonitoringConfig {
        MonitoringConfig {
            service_name: "conductor-node".to_string(),
            log_filter: self.log_level.clone(),
            enable_json_logging: self.log_json,
            log_file: self.log_file.clone(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            redis_url: None,
            backplane_channel: default_channel(),
            definition_sweep_secs: default_sweep_secs(),
            log_level: default_log_level(),
            log_json: false,
            log_file: None,
        }
    }
}
