// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapdesk serve` command implementation.
//!
//! Wires the instance repository, gateway client, health monitor,
//! reconnect trigger, optional scheduled reconcile sweep, and the webhook
//! server, then runs until SIGTERM/SIGINT.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use zapdesk_config::ZapdeskConfig;
use zapdesk_core::{GatewayApi, ZapdeskError};
use zapdesk_gateway::GatewayClient;
use zapdesk_storage::queries::instances;
use zapdesk_storage::Database;
use zapdesk_sync::{
    ConnectionPoller, HealthEvent, HealthMonitor, MonitorSettings, PollerSettings, Reconciler,
    TaskKind, TaskRegistry,
};
use zapdesk_webhook::{WebhookAuth, WebhookState};

/// Runs the `zapdesk serve` command.
pub async fn run_serve(config: ZapdeskConfig) -> Result<(), ZapdeskError> {
    info!("starting zapdesk serve");

    let db = Database::open(&config.storage.database_path).await?;

    let api_token = config.gateway.api_token.as_deref().ok_or_else(|| {
        ZapdeskError::Config("gateway.api_token is required to run serve".into())
    })?;
    let gateway: Arc<dyn GatewayApi> = Arc::new(GatewayClient::new(
        &config.gateway.base_url,
        api_token,
        config.gateway.request_timeout(),
    )?);

    match gateway.check_health().await {
        Ok(health) if health.online => info!(
            latency_ms = health.latency_ms,
            version = health.version.as_deref().unwrap_or("unknown"),
            "gateway online"
        ),
        Ok(_) => warn!("gateway health endpoint reported not ok"),
        Err(e) => warn!(error = %e, "gateway unreachable at startup, continuing"),
    }

    let tasks = Arc::new(TaskRegistry::new());
    let (monitor, health_events) = HealthMonitor::new(
        gateway.clone(),
        MonitorSettings {
            probe_interval: config.health.probe_interval(),
            failure_threshold: config.health.failure_threshold,
        },
    );
    let poller = ConnectionPoller::new(
        gateway.clone(),
        db.clone(),
        PollerSettings {
            interval: config.poller.interval(),
            timeout: config.poller.timeout(),
        },
    );

    let shutdown = install_signal_handler();

    // Converge monitors with the set of connected instances: the first pass
    // resumes monitoring after a restart, later passes pick up instances
    // connected via webhook or poller and drop deleted ones.
    spawn_monitor_supervisor(
        db.clone(),
        monitor.clone(),
        tasks.clone(),
        shutdown.clone(),
    );

    spawn_reconnect_trigger(
        health_events,
        db.clone(),
        poller,
        tasks.clone(),
        shutdown.clone(),
    );

    if config.reconcile.auto_sweep {
        spawn_scheduled_sweep(&config, gateway.clone(), db.clone(), shutdown.clone());
    }

    let state = WebhookState {
        db: db.clone(),
        auth: WebhookAuth {
            token: config.server.webhook_token.clone(),
        },
    };
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    zapdesk_webhook::serve(&addr, state, shutdown.clone()).await?;

    info!("shutting down");
    tasks.cancel_all();
    db.close().await?;
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] cancelled when either signal arrives.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

/// Keep monitor tasks in lockstep with the connected instance set.
///
/// Monitoring must start when an instance enters `connected` (whichever of
/// webhook or poller observed it) and stop when the instance disappears or
/// disconnects. Rather than threading the monitor through every write path,
/// this loop reconciles the two sets on a short cadence.
fn spawn_monitor_supervisor(
    db: Database,
    monitor: HealthMonitor,
    tasks: Arc<TaskRegistry>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(15));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let connected = match instances::list_connected(&db).await {
                Ok(records) => records,
                Err(e) => {
                    error!(error = %e, "monitor supervisor could not list instances");
                    continue;
                }
            };

            let connected_ids: std::collections::HashSet<String> =
                connected.iter().map(|r| r.id.clone()).collect();

            for record in &connected {
                if let Some(gateway_id) = record
                    .gateway_instance_id
                    .as_deref()
                    .filter(|g| !g.is_empty())
                    && !tasks.is_active(TaskKind::Monitor, &record.id)
                {
                    monitor.start_monitoring(&tasks, &record.id, gateway_id);
                }
            }

            for instance_id in monitor.monitored_ids() {
                if !connected_ids.contains(&instance_id) {
                    monitor.stop_monitoring(&tasks, &instance_id);
                }
            }
        }
        debug!("monitor supervisor stopped");
    });
}

/// Consume health events and re-invoke the poller for flagged instances.
fn spawn_reconnect_trigger(
    mut events: tokio::sync::mpsc::Receiver<HealthEvent>,
    db: Database,
    poller: ConnectionPoller,
    tasks: Arc<TaskRegistry>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                HealthEvent::NeedsReconnection { instance_id } => {
                    match instances::get_instance(&db, &instance_id).await {
                        Ok(Some(record)) => {
                            if let Some(gateway_id) = record
                                .gateway_instance_id
                                .as_deref()
                                .filter(|g| !g.is_empty())
                            {
                                warn!(
                                    instance_id = %instance_id,
                                    "instance needs reconnection, restarting poller"
                                );
                                poller.spawn(&tasks, &instance_id, gateway_id);
                            }
                        }
                        Ok(None) => debug!(
                            instance_id = %instance_id,
                            "flagged instance no longer exists"
                        ),
                        Err(e) => error!(
                            instance_id = %instance_id,
                            error = %e,
                            "failed to load flagged instance"
                        ),
                    }
                }
                HealthEvent::Recovered { instance_id } => {
                    info!(instance_id = %instance_id, "instance heartbeat recovered");
                }
            }
        }
        debug!("reconnect trigger stopped");
    });
}

/// Periodic reconciliation sweep across every tenant in the repository.
fn spawn_scheduled_sweep(
    config: &ZapdeskConfig,
    gateway: Arc<dyn GatewayApi>,
    db: Database,
    shutdown: CancellationToken,
) {
    let reconciler = Reconciler::new(gateway, db.clone(), config.reconcile.grace_window());
    let interval = config.reconcile.sweep_interval();
    let apply = config.reconcile.sweep_apply;

    info!(
        interval_secs = interval.as_secs(),
        apply, "scheduled reconciliation sweep enabled"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a sweep does not race
        // startup monitor resumption.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let tenants = match instances::list_tenants(&db).await {
                Ok(tenants) => tenants,
                Err(e) => {
                    error!(error = %e, "sweep could not enumerate tenants");
                    continue;
                }
            };

            for tenant_id in tenants {
                if apply {
                    match reconciler.apply(&tenant_id).await {
                        Ok(summary) => info!(
                            tenant_id = %tenant_id,
                            adopted = summary.adopted,
                            deleted = summary.deleted,
                            skipped = summary.skipped,
                            errors = summary.errors.len(),
                            "sweep applied"
                        ),
                        Err(e) => warn!(tenant_id = %tenant_id, error = %e, "sweep failed"),
                    }
                } else {
                    match reconciler.analyze(&tenant_id).await {
                        Ok(plan) => info!(
                            tenant_id = %tenant_id,
                            matched = plan.matched,
                            adoptable = plan.adoptable().count(),
                            stale = plan.stale.len(),
                            "sweep analysis (read-only)"
                        ),
                        Err(e) => warn!(tenant_id = %tenant_id, error = %e, "sweep scan failed"),
                    }
                }
            }
        }
        debug!("scheduled sweep stopped");
    });
}
