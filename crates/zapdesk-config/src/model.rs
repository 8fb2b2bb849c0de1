// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Zapdesk sync engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Zapdesk configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values; only `gateway.api_token` must be supplied before talking to a
/// real gateway.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZapdeskConfig {
    /// Webhook server and process-level settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Device gateway endpoint and credentials.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Connection state poller cadence.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Health monitor cadence and thresholds.
    #[serde(default)]
    pub health: HealthConfig,

    /// Orphan reconciliation sweep settings.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Webhook server and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the webhook server binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the webhook server binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Shared secret the gateway sends as a bearer token on webhook posts.
    /// `None` leaves the webhook endpoint open.
    #[serde(default)]
    pub webhook_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            log_level: default_log_level(),
            webhook_token: None,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8085
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Device gateway endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the device gateway REST API.
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Bearer token for gateway calls. `None` disables the gateway client.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_gateway_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    12
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("zapdesk").join("zapdesk.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("zapdesk.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Connection state poller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PollerConfig {
    /// Seconds between status probes while waiting for a connect.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    /// Total seconds before a pairing wait gives up.
    #[serde(default = "default_poll_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_timeout_secs() -> u64 {
    60
}

/// Health monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Seconds between heartbeat probes per connected instance.
    /// Deliberately coarse so monitoring never hammers the gateway.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Consecutive failures before an instance is flagged for reconnection.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

fn default_probe_interval_secs() -> u64 {
    45
}

fn default_failure_threshold() -> u32 {
    3
}

/// Orphan reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Minimum age in seconds before an unlinked record counts as orphaned.
    #[serde(default = "default_grace_window_secs")]
    pub grace_window_secs: u64,

    /// Seconds between scheduled sweeps when `auto_sweep` is on.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Run the sweep on a schedule inside `serve`.
    #[serde(default)]
    pub auto_sweep: bool,

    /// Let the scheduled sweep apply adoptions/deletions instead of only
    /// reporting them.
    #[serde(default)]
    pub sweep_apply: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            grace_window_secs: default_grace_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            auto_sweep: false,
            sweep_apply: false,
        }
    }
}

impl ReconcileConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_grace_window_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    900
}
