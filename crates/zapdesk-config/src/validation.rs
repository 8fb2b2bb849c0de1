// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes: address shapes, URL schemes, and cadence relationships
//! between the poller interval and timeout.

use crate::diagnostic::ConfigError;
use crate::model::ZapdeskConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects all failures rather than stopping at the first one.
pub fn validate_config(config: &ZapdeskConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let addr = config.server.bind_address.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.bind_address must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!(
                    "server.bind_address `{addr}` is not a valid IP address or hostname"
                ),
            });
        }
    }

    let base_url = config.gateway.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::Validation {
            message: format!(
                "gateway.base_url must start with http:// or https://, got `{base_url}`"
            ),
        });
    }

    if config.gateway.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "gateway.request_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.poller.interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "poller.interval_secs must be at least 1".to_string(),
        });
    }
    if config.poller.interval_secs >= config.poller.timeout_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "poller.interval_secs ({}) must be smaller than poller.timeout_secs ({})",
                config.poller.interval_secs, config.poller.timeout_secs
            ),
        });
    }

    if config.health.failure_threshold == 0 {
        errors.push(ConfigError::Validation {
            message: "health.failure_threshold must be at least 1".to_string(),
        });
    }
    if config.health.probe_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "health.probe_interval_secs must be at least 1".to_string(),
        });
    }

    // A grace window shorter than one minute races in-flight creations.
    if config.reconcile.grace_window_secs < 60 {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconcile.grace_window_secs must be at least 60, got {}",
                config.reconcile.grace_window_secs
            ),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ZapdeskConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_non_http_gateway_url() {
        let mut config = ZapdeskConfig::default();
        config.gateway.base_url = "ftp://gw.internal".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("gateway.base_url")));
    }

    #[test]
    fn rejects_interval_not_below_timeout() {
        let mut config = ZapdeskConfig::default();
        config.poller.interval_secs = 60;
        config.poller.timeout_secs = 60;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("poller.interval_secs")));
    }

    #[test]
    fn rejects_zero_failure_threshold() {
        let mut config = ZapdeskConfig::default();
        config.health.failure_threshold = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("failure_threshold")));
    }

    #[test]
    fn rejects_short_grace_window() {
        let mut config = ZapdeskConfig::default();
        config.reconcile.grace_window_secs = 10;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("grace_window_secs")));
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = ZapdeskConfig::default();
        config.server.bind_address = String::new();
        config.storage.database_path = String::new();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 2);
    }
}
