// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection state poller.
//!
//! One poller task per pairing instance. The first probe fires immediately
//! so a fast connect is not penalized by a full interval wait; after that,
//! probes run on a fixed interval until the gateway reports the session
//! open, the overall timeout elapses, or the caller cancels. Transient
//! probe errors are swallowed -- the loop itself is the retry.
//!
//! The webhook path races this poller on the same record. Both sides go
//! through the repository's idempotent partial update, so whichever
//! observes the connect first wins and the other write becomes a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zapdesk_core::types::{ConnectionUpdate, GatewayState, now_iso};
use zapdesk_core::{GatewayApi, ZapdeskError};
use zapdesk_storage::queries::instances;
use zapdesk_storage::Database;

use crate::tasks::{TaskKind, TaskRegistry};

/// Poller cadence.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Delay between status probes.
    pub interval: Duration,
    /// Total pairing wait before giving up.
    pub timeout: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        PollerSettings {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Terminal state of one polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Connected,
    TimedOut,
    Cancelled,
}

/// Polls the gateway for one instance's connection state until terminal.
#[derive(Clone)]
pub struct ConnectionPoller {
    gateway: Arc<dyn GatewayApi>,
    db: Database,
    settings: PollerSettings,
}

impl ConnectionPoller {
    pub fn new(gateway: Arc<dyn GatewayApi>, db: Database, settings: PollerSettings) -> Self {
        ConnectionPoller {
            gateway,
            db,
            settings,
        }
    }

    /// Run the polling state machine to a terminal state.
    ///
    /// On connect, the repository record is marked `connected` before this
    /// returns. On timeout the record is left as-is for a later retry or
    /// the reconciler; the instance may still connect via webhook.
    pub async fn run(
        &self,
        instance_id: &str,
        gateway_instance_id: &str,
        cancel: CancellationToken,
    ) -> Result<PollOutcome, ZapdeskError> {
        let deadline = tokio::time::Instant::now() + self.settings.timeout;
        let mut ticker = tokio::time::interval(self.settings.interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(instance_id, "connection poll cancelled");
                    return Ok(PollOutcome::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        instance_id,
                        timeout_secs = self.settings.timeout.as_secs(),
                        "pairing wait timed out"
                    );
                    return Ok(PollOutcome::TimedOut);
                }
                _ = ticker.tick() => {
                    match self.gateway.get_connection_state(gateway_instance_id).await {
                        Ok(GatewayState::Open) => {
                            self.mark_connected(instance_id).await?;
                            info!(instance_id, "instance connected (observed by poller)");
                            return Ok(PollOutcome::Connected);
                        }
                        Ok(state) => {
                            debug!(instance_id, state = %state, "still pairing");
                            self.refresh_qr(instance_id, gateway_instance_id).await;
                        }
                        Err(e) => {
                            // Transient errors must not abort the wait.
                            debug!(instance_id, error = %e, "status probe failed, continuing");
                        }
                    }
                }
            }
        }
    }

    /// Spawn a detached polling task, replacing any existing poller for the
    /// same instance.
    pub fn spawn(&self, tasks: &Arc<TaskRegistry>, instance_id: &str, gateway_instance_id: &str) {
        let (token, generation) = tasks.register(TaskKind::Poller, instance_id);
        let poller = self.clone();
        let tasks = tasks.clone();
        let instance_id = instance_id.to_string();
        let gateway_instance_id = gateway_instance_id.to_string();

        tokio::spawn(async move {
            match poller.run(&instance_id, &gateway_instance_id, token).await {
                Ok(outcome) => {
                    debug!(instance_id = %instance_id, ?outcome, "connection poll finished")
                }
                Err(e) => warn!(instance_id = %instance_id, error = %e, "connection poll aborted"),
            }
            tasks.release(TaskKind::Poller, &instance_id, generation);
        });
    }

    async fn mark_connected(&self, instance_id: &str) -> Result<(), ZapdeskError> {
        let Some(record) = instances::get_instance(&self.db, instance_id).await? else {
            // Deleted while we were polling; nothing to update.
            debug!(instance_id, "instance gone before connect could be recorded");
            return Ok(());
        };

        let mut update = ConnectionUpdate::connected(Some(GatewayState::Open.to_string()));
        if record.date_connected.is_none() {
            update.date_connected = Some(now_iso());
        }
        instances::update_connection_state(&self.db, instance_id, &update).await?;
        Ok(())
    }

    /// Best-effort QR refresh while the session is still pairing.
    async fn refresh_qr(&self, instance_id: &str, gateway_instance_id: &str) {
        match self.gateway.get_qr_code(gateway_instance_id).await {
            Ok(poll) => {
                if let Some(qr) = poll.qr_code
                    && let Err(e) = instances::update_connection_state(
                        &self.db,
                        instance_id,
                        &ConnectionUpdate::qr_ready(qr),
                    )
                    .await
                {
                    warn!(instance_id, error = %e, "failed to store refreshed QR code");
                }
            }
            Err(e) => debug!(instance_id, error = %e, "QR probe failed, continuing"),
        }
    }
}
