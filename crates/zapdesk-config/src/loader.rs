// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./zapdesk.toml` > `~/.config/zapdesk/zapdesk.toml`
//! > `/etc/zapdesk/zapdesk.toml` with environment variable overrides via the
//! `ZAPDESK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ZapdeskConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/zapdesk/zapdesk.toml` (system-wide)
/// 3. `~/.config/zapdesk/zapdesk.toml` (user XDG config)
/// 4. `./zapdesk.toml` (local directory)
/// 5. `ZAPDESK_*` environment variables
pub fn load_config() -> Result<ZapdeskConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ZapdeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ZapdeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for
/// diagnostic use so callers can inspect provider metadata).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(Toml::file("/etc/zapdesk/zapdesk.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("zapdesk/zapdesk.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("zapdesk.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so underscore-containing
/// key names stay unambiguous: `ZAPDESK_GATEWAY_API_TOKEN` must map to
/// `gateway.api_token`, not `gateway.api.token`.
fn env_provider() -> Env {
    Env::prefixed("ZAPDESK_").map(|key| {
        // `key` is the lowercased env var name with the prefix stripped,
        // e.g. ZAPDESK_GATEWAY_API_TOKEN -> "gateway_api_token".
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("poller_", "poller.", 1)
            .replacen("health_", "health.", 1)
            .replacen("reconcile_", "reconcile.", 1);
        mapped.into()
    })
}
