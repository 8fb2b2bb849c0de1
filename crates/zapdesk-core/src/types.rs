// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Zapdesk sync engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Coarse connection state of an instance, as tracked by the CRM.
///
/// `Connected` is sticky: the repository refuses writes that would take a
/// connected instance back to `Connecting`/`QrReady`, and `Disconnected`
/// requires an explicit disconnect (see [`ConnectionUpdate`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    QrReady,
    Connected,
    Disconnected,
    Error,
}

/// Fine-grained connection state as reported by the device gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    Open,
    Connecting,
    Closed,
    Unknown,
}

impl GatewayState {
    /// Lenient parse for gateway responses; unrecognized vocabulary maps to
    /// `Unknown` rather than failing the whole poll.
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(GatewayState::Unknown)
    }
}

/// The authoritative tenant-scoped record of one WhatsApp connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub tenant_id: String,
    /// Human-chosen name, unique per tenant.
    pub instance_name: String,
    /// Identifier assigned by the gateway. `None` until phase-B provisioning
    /// succeeds; a long-lived `None` marks an orphaned reservation.
    pub gateway_instance_id: Option<String>,
    pub connection_status: ConnectionStatus,
    /// Raw gateway vocabulary, kept for diagnostics.
    pub gateway_status: Option<String>,
    /// Transient pairing code; cleared once connected.
    pub qr_code: Option<String>,
    pub phone: Option<String>,
    pub profile_name: Option<String>,
    pub profile_pic_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Set once, on the first successful connect.
    pub date_connected: Option<String>,
}

impl Instance {
    /// A fresh reservation in `Connecting` state with no gateway link yet.
    pub fn reservation(tenant_id: &str, instance_name: &str) -> Self {
        let now = now_iso();
        Instance {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            instance_name: instance_name.to_string(),
            gateway_instance_id: None,
            connection_status: ConnectionStatus::Connecting,
            gateway_status: None,
            qr_code: None,
            phone: None,
            profile_name: None,
            profile_pic_url: None,
            created_at: now.clone(),
            updated_at: now,
            date_connected: None,
        }
    }

    /// Whether the record carries a usable gateway link.
    pub fn has_gateway_link(&self) -> bool {
        self.gateway_instance_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }
}

/// Partial update applied to an instance's connection fields.
///
/// Fields left as `None` are untouched, which is what makes the poller and
/// the webhook handler safe to race on the same record. `qr_code` is doubly
/// optional so a `ready` event can clear it (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpdate {
    pub connection_status: Option<ConnectionStatus>,
    pub gateway_status: Option<String>,
    pub qr_code: Option<Option<String>>,
    pub phone: Option<String>,
    pub profile_name: Option<String>,
    pub profile_pic_url: Option<String>,
    pub date_connected: Option<String>,
    /// Marks a deliberate disconnect. Without it, a `Disconnected` write
    /// against a connected row is treated as stale and dropped.
    pub explicit_disconnect: bool,
}

impl ConnectionUpdate {
    /// The transition applied when a QR code becomes available.
    pub fn qr_ready(qr: String) -> Self {
        ConnectionUpdate {
            connection_status: Some(ConnectionStatus::QrReady),
            qr_code: Some(Some(qr)),
            ..Default::default()
        }
    }

    /// The transition applied on a confirmed connect. Clears the QR code.
    pub fn connected(gateway_status: Option<String>) -> Self {
        ConnectionUpdate {
            connection_status: Some(ConnectionStatus::Connected),
            gateway_status,
            qr_code: Some(None),
            ..Default::default()
        }
    }
}

/// One live session in the gateway's own inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySession {
    pub gateway_instance_id: String,
    pub phone: Option<String>,
    pub status: String,
    pub name: Option<String>,
}

/// Result of a gateway liveness probe.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayHealth {
    pub online: bool,
    pub latency_ms: u64,
    pub version: Option<String>,
}

/// Result of one QR-code poll. `waiting` means the gateway has not produced
/// a code yet and the caller should poll again.
#[derive(Debug, Clone, PartialEq)]
pub struct QrPoll {
    pub qr_code: Option<String>,
    pub waiting: bool,
}

/// Gateway-side provisioning result.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedInstance {
    pub gateway_instance_id: String,
    pub qr_code: Option<String>,
}

/// Current wall-clock time as the ISO-8601 string format used throughout
/// the repository (matches SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ')`).
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
