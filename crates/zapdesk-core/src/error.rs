// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Zapdesk instance sync engine.

use thiserror::Error;

/// The primary error type used across the Zapdesk workspace.
///
/// Variants are split along the recovery boundary the sync engine cares
/// about: callers may retry recoverable failures (gateway unreachable,
/// timeouts) but must never retry rejections or validation errors.
#[derive(Debug, Error)]
pub enum ZapdeskError {
    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The instance name is already claimed within the tenant.
    #[error("instance name `{name}` is already in use for tenant {tenant_id}")]
    DuplicateName { tenant_id: String, name: String },

    /// The instance name failed validation before any provisioning started.
    #[error("invalid instance name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },

    /// The device gateway could not be reached (timeout, connection refused, 5xx).
    #[error("gateway unreachable: {message}")]
    GatewayUnreachable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The device gateway rejected the request (4xx). Not retryable.
    #[error("gateway rejected request ({status}): {message}")]
    GatewayRejected { status: u16, message: String },

    /// A referenced record no longer exists in the repository.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// An adoption target collides with an existing record.
    #[error("cannot adopt gateway session {gateway_instance_id}: {reason}")]
    ReconciliationConflict {
        gateway_instance_id: String,
        reason: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZapdeskError {
    /// Whether a caller may retry the failed operation.
    ///
    /// Only transport-level failures qualify. A `GatewayRejected` means the
    /// gateway processed and refused the request; retrying cannot help.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ZapdeskError::GatewayUnreachable { .. } | ZapdeskError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        let unreachable = ZapdeskError::GatewayUnreachable {
            message: "connection refused".into(),
            source: None,
        };
        let timeout = ZapdeskError::Timeout {
            duration: std::time::Duration::from_secs(12),
        };
        let rejected = ZapdeskError::GatewayRejected {
            status: 400,
            message: "bad name".into(),
        };
        let duplicate = ZapdeskError::DuplicateName {
            tenant_id: "t1".into(),
            name: "sales".into(),
        };

        assert!(unreachable.is_recoverable());
        assert!(timeout.is_recoverable());
        assert!(!rejected.is_recoverable());
        assert!(!duplicate.is_recoverable());
    }

    #[test]
    fn error_messages_name_the_cause() {
        let err = ZapdeskError::DuplicateName {
            tenant_id: "acme".into(),
            name: "support".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("support"));
        assert!(msg.contains("acme"));

        let err = ZapdeskError::GatewayRejected {
            status: 422,
            message: "name too long".into(),
        };
        assert!(err.to_string().contains("422"));
    }
}
