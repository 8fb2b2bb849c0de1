// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Zapdesk configuration system.

use zapdesk_config::diagnostic::{suggest_key, ConfigError};
use zapdesk_config::model::ZapdeskConfig;
use zapdesk_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[server]
bind_address = "0.0.0.0"
port = 9090
log_level = "debug"
webhook_token = "hook-secret"

[gateway]
base_url = "https://gw.example.com"
api_token = "gw-secret"
request_timeout_secs = 15

[storage]
database_path = "/tmp/zapdesk-test.db"
wal_mode = false

[poller]
interval_secs = 3
timeout_secs = 90

[health]
probe_interval_secs = 60
failure_threshold = 5

[reconcile]
grace_window_secs = 600
sweep_interval_secs = 1800
auto_sweep = true
sweep_apply = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.bind_address, "0.0.0.0");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.webhook_token.as_deref(), Some("hook-secret"));
    assert_eq!(config.gateway.base_url, "https://gw.example.com");
    assert_eq!(config.gateway.api_token.as_deref(), Some("gw-secret"));
    assert_eq!(config.gateway.request_timeout_secs, 15);
    assert_eq!(config.storage.database_path, "/tmp/zapdesk-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.poller.interval_secs, 3);
    assert_eq!(config.poller.timeout_secs, 90);
    assert_eq!(config.health.failure_threshold, 5);
    assert_eq!(config.reconcile.grace_window_secs, 600);
    assert!(config.reconcile.auto_sweep);
    assert!(!config.reconcile.sweep_apply);
}

/// Missing optional sections fall back to defaults without error.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    assert_eq!(config.server.bind_address, "127.0.0.1");
    assert_eq!(config.server.port, 8085);
    assert!(config.gateway.api_token.is_none());
    assert_eq!(config.poller.interval_secs, 5);
    assert_eq!(config.poller.timeout_secs, 60);
    assert_eq!(config.health.failure_threshold, 3);
    assert_eq!(config.reconcile.grace_window_secs, 300);
}

/// Unknown field inside a section is rejected by deny_unknown_fields.
#[test]
fn unknown_field_in_gateway_is_rejected() {
    let toml = r#"
[gateway]
api_tokn = "oops"
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("api_tokn"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// Unknown top-level section is rejected.
#[test]
fn unknown_top_level_section_is_rejected() {
    let toml = r#"
[metrics]
enabled = true
"#;

    let err = load_config_from_str(toml).expect_err("unknown section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("metrics"),
        "got: {err_str}"
    );
}

/// Env-style dotted overrides merge on top of TOML values.
#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let toml_content = r#"
[gateway]
api_token = "from-toml"
"#;

    let config: ZapdeskConfig = Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(Toml::string(toml_content))
        .merge(("gateway.api_token", "from-env"))
        .extract()
        .expect("should merge override");

    assert_eq!(config.gateway.api_token.as_deref(), Some("from-env"));
}

/// `gateway.api_token` maps as one key, not `gateway.api.token`.
#[test]
fn underscore_keys_stay_unsplit() {
    use figment::{providers::Serialized, Figment};

    let config: ZapdeskConfig = Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(("poller.timeout_secs", 120u64))
        .extract()
        .expect("should set timeout via dot notation");

    assert_eq!(config.poller.timeout_secs, 120);
}

/// Missing config files are silently skipped.
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: ZapdeskConfig = Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(Toml::file("/nonexistent/path/zapdesk.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.server.bind_address, "127.0.0.1");
}

/// Unknown key produces an UnknownKey diagnostic with a suggestion.
#[test]
fn diagnostic_carries_suggestion_and_valid_keys() {
    let toml = r#"
[gateway]
api_tokn = "oops"
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    assert!(!errors.is_empty());

    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "api_tokn"
                && suggestion.as_deref() == Some("api_token")
                && valid_keys.contains("base_url")
        })
    });
    assert!(
        has_unknown_key,
        "should have UnknownKey for `api_tokn` suggesting `api_token`, got: {errors:?}"
    );
}

/// Invalid type (string where number expected) produces a clear message.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[poller]
interval_secs = "fast"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("interval_secs"),
        "got: {err_str}"
    );
}

/// ConfigError renders through miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::GraphicalReportHandler;

    let error = ConfigError::UnknownKey {
        key: "api_tokn".to_string(),
        suggestion: Some("api_token".to_string()),
        valid_keys: "base_url, api_token, request_timeout_secs".to_string(),
        span: None,
        src: None,
    };

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("api_tokn"));
    assert!(buf.contains("did you mean `api_token`"));
}

/// Semantic validation rejects a poller interval at or above the timeout.
#[test]
fn validation_rejects_bad_poller_cadence() {
    let toml = r#"
[poller]
interval_secs = 60
timeout_secs = 30
"#;

    let errors = load_and_validate_str(toml).expect_err("bad cadence should fail");
    let has_validation_error = errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("interval_secs"))
    });
    assert!(has_validation_error, "got: {errors:?}");
}

/// suggest_key works for this crate's own vocabulary.
#[test]
fn suggest_key_handles_section_vocabulary() {
    assert_eq!(
        suggest_key("grace_windw_secs", &["grace_window_secs", "auto_sweep"]),
        Some("grace_window_secs".to_string())
    );
    assert_eq!(suggest_key("xyz", &["grace_window_secs"]), None);
}
