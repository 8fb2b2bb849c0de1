// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health monitor for connected instances.
//!
//! One probe loop per monitored instance, on a deliberately coarse cadence
//! so monitoring never hammers the gateway. The monitor owns its health
//! records: a record is inserted when monitoring starts and removed when it
//! stops or the instance is deleted, so no record can outlive its instance.
//! Crossing the consecutive-failure threshold emits a single
//! [`HealthEvent::NeedsReconnection`]; a later successful probe resets the
//! counter and emits [`HealthEvent::Recovered`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use zapdesk_core::types::{GatewayState, now_iso};
use zapdesk_core::GatewayApi;

use crate::tasks::{TaskKind, TaskRegistry};

/// Monitor cadence and thresholds.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub probe_interval: Duration,
    pub failure_threshold: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            probe_interval: Duration::from_secs(45),
            failure_threshold: 3,
        }
    }
}

/// Per-instance heartbeat bookkeeping while monitored.
#[derive(Debug, Clone, Default)]
struct HealthRecord {
    last_heartbeat_at: Option<String>,
    consecutive_failures: u32,
}

/// Point-in-time view of one instance's health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub instance_id: String,
    pub last_heartbeat_at: Option<String>,
    pub consecutive_failures: u32,
    pub is_healthy: bool,
    pub needs_reconnection: bool,
}

/// Events emitted when an instance crosses the failure threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    NeedsReconnection { instance_id: String },
    Recovered { instance_id: String },
}

/// Periodic heartbeat checker for connected instances.
///
/// Cheap to clone; all clones share one record map and event channel.
#[derive(Clone)]
pub struct HealthMonitor {
    gateway: Arc<dyn GatewayApi>,
    settings: MonitorSettings,
    records: Arc<DashMap<String, HealthRecord>>,
    events: mpsc::Sender<HealthEvent>,
}

impl HealthMonitor {
    /// Create a monitor and the receiver for its threshold events.
    pub fn new(
        gateway: Arc<dyn GatewayApi>,
        settings: MonitorSettings,
    ) -> (Self, mpsc::Receiver<HealthEvent>) {
        let (events, receiver) = mpsc::channel(64);
        (
            HealthMonitor {
                gateway,
                settings,
                records: Arc::new(DashMap::new()),
                events,
            },
            receiver,
        )
    }

    /// Begin monitoring an instance, replacing any existing monitor task.
    pub fn start_monitoring(
        &self,
        tasks: &Arc<TaskRegistry>,
        instance_id: &str,
        gateway_instance_id: &str,
    ) {
        let (token, generation) = tasks.register(TaskKind::Monitor, instance_id);
        self.records
            .insert(instance_id.to_string(), HealthRecord::default());

        let monitor = self.clone();
        let tasks = tasks.clone();
        let instance_id = instance_id.to_string();
        let gateway_instance_id = gateway_instance_id.to_string();

        tokio::spawn(async move {
            debug!(instance_id = %instance_id, "health monitoring started");
            let mut ticker = tokio::time::interval(monitor.settings.probe_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.probe(&instance_id, &gateway_instance_id).await;
                    }
                }
            }
            tasks.release(TaskKind::Monitor, &instance_id, generation);
            debug!(instance_id = %instance_id, "health monitoring stopped");
        });
    }

    /// Stop monitoring and discard the health record.
    pub fn stop_monitoring(&self, tasks: &TaskRegistry, instance_id: &str) {
        tasks.cancel(TaskKind::Monitor, instance_id);
        self.records.remove(instance_id);
    }

    /// One heartbeat probe: update the record and emit threshold events.
    pub async fn probe(&self, instance_id: &str, gateway_instance_id: &str) {
        let healthy = matches!(
            self.gateway.get_connection_state(gateway_instance_id).await,
            Ok(GatewayState::Open)
        );

        let threshold = self.settings.failure_threshold;
        let event = {
            // The record may already be gone if monitoring was stopped while
            // this probe was in flight; do not resurrect it.
            let Some(mut record) = self.records.get_mut(instance_id) else {
                return;
            };
            if healthy {
                let was_flagged = record.consecutive_failures >= threshold;
                record.consecutive_failures = 0;
                record.last_heartbeat_at = Some(now_iso());
                was_flagged.then(|| HealthEvent::Recovered {
                    instance_id: instance_id.to_string(),
                })
            } else {
                record.consecutive_failures += 1;
                debug!(
                    instance_id,
                    consecutive_failures = record.consecutive_failures,
                    "heartbeat probe failed"
                );
                (record.consecutive_failures == threshold).then(|| {
                    HealthEvent::NeedsReconnection {
                        instance_id: instance_id.to_string(),
                    }
                })
            }
        };

        if let Some(event) = event
            && let Err(e) = self.events.try_send(event)
        {
            warn!(instance_id, error = %e, "health event channel full, dropping event");
        }
    }

    /// Current health view of one instance, if monitored.
    pub fn snapshot(&self, instance_id: &str) -> Option<HealthSnapshot> {
        self.records.get(instance_id).map(|record| HealthSnapshot {
            instance_id: instance_id.to_string(),
            last_heartbeat_at: record.last_heartbeat_at.clone(),
            consecutive_failures: record.consecutive_failures,
            is_healthy: record.consecutive_failures < self.settings.failure_threshold,
            needs_reconnection: record.consecutive_failures >= self.settings.failure_threshold,
        })
    }

    /// Number of instances currently monitored.
    pub fn monitored_count(&self) -> usize {
        self.records.len()
    }

    /// Ids of all currently monitored instances.
    pub fn monitored_ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }
}
