//! Monitoring for the Conductor platform.
//!
//! Structured logging setup lives in [`logging`], counter helpers for the
//! coordination layer live in [`metrics`].

use serde::{Deserialize, Serialize};

pub mod logging;
pub mod metrics;

pub use logging::init_logging;

/// Configuration for initializing logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter (e.g., "info,conductor_cluster=debug")
    pub log_filter: String,
    /// Emit JSON lines instead of pretty output on stdout
    pub enable_json_logging: bool,
    /// Optional file that receives a daily-rolling JSON copy of every log line
    pub log_file: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "conductor".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MonitoringConfig::default();
        assert_eq!(config.service_name, "conductor");
        assert_eq!(config.log_filter, "info");
        assert!(!config.enable_json_logging);
        assert!(config.log_file.is_none());
    }
}
