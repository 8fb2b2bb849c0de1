// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The device gateway contract.
//!
//! Every operation the sync engine performs against the remote WhatsApp
//! bridge goes through this trait, so the orchestrator, poller, monitor,
//! and reconciler can be exercised against scripted stubs in tests.

use async_trait::async_trait;

use crate::error::ZapdeskError;
use crate::types::{CreatedInstance, GatewayHealth, GatewaySession, GatewayState, QrPoll};

/// HTTP surface of the device gateway.
///
/// Implementations must not retry internally; retry policy belongs to the
/// caller. Errors are classified via [`ZapdeskError::is_recoverable`]:
/// transport failures and 5xx map to `GatewayUnreachable`/`Timeout`,
/// 4xx maps to `GatewayRejected`.
#[async_trait]
pub trait GatewayApi: Send + Sync + 'static {
    /// Liveness probe. `online` is false when the gateway answers with a
    /// non-success status; transport failures are returned as errors.
    async fn check_health(&self) -> Result<GatewayHealth, ZapdeskError>;

    /// Provision a new gateway-side instance. May return an initial QR code.
    async fn create_instance(&self, name: &str) -> Result<CreatedInstance, ZapdeskError>;

    /// Current connection state of one gateway session.
    async fn get_connection_state(
        &self,
        gateway_instance_id: &str,
    ) -> Result<GatewayState, ZapdeskError>;

    /// Fetch the current pairing QR code, if the gateway has produced one.
    async fn get_qr_code(&self, gateway_instance_id: &str) -> Result<QrPoll, ZapdeskError>;

    /// Full inventory of sessions the gateway currently holds.
    async fn list_instances(&self) -> Result<Vec<GatewaySession>, ZapdeskError>;

    /// Tear down a gateway session. Deleting an already-gone session is ok.
    async fn delete_instance(&self, gateway_instance_id: &str) -> Result<(), ZapdeskError>;
}
