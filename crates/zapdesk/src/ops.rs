// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator one-shot commands: create, delete, refresh-qr, sync, status.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use zapdesk_config::ZapdeskConfig;
use zapdesk_core::{GatewayApi, ZapdeskError};
use zapdesk_gateway::GatewayClient;
use zapdesk_storage::queries::instances;
use zapdesk_storage::Database;
use zapdesk_sync::{
    ConnectionPoller, Orchestrator, PollOutcome, PollerSettings, QrRefresh, Reconciler,
    TaskRegistry,
};

async fn open_clients(
    config: &ZapdeskConfig,
) -> Result<(Database, Arc<dyn GatewayApi>), ZapdeskError> {
    let db = Database::open(&config.storage.database_path).await?;
    let api_token = config
        .gateway
        .api_token
        .as_deref()
        .ok_or_else(|| ZapdeskError::Config("gateway.api_token is required".into()))?;
    let gateway: Arc<dyn GatewayApi> = Arc::new(GatewayClient::new(
        &config.gateway.base_url,
        api_token,
        config.gateway.request_timeout(),
    )?);
    Ok((db, gateway))
}

/// `zapdesk create` -- two-phase creation, then wait for pairing.
pub async fn run_create(
    config: ZapdeskConfig,
    tenant_id: &str,
    name: &str,
) -> Result<(), ZapdeskError> {
    let (db, gateway) = open_clients(&config).await?;
    let tasks = Arc::new(TaskRegistry::new());
    let orchestrator = Orchestrator::new(gateway.clone(), db.clone(), tasks);

    let record = orchestrator.create_instance(tenant_id, name).await?;
    println!(
        "created instance `{}` (id {}, status {})",
        record.instance_name, record.id, record.connection_status
    );

    let Some(gateway_id) = record
        .gateway_instance_id
        .as_deref()
        .filter(|g| !g.is_empty())
    else {
        println!(
            "gateway was unreachable; the reservation is kept and will be \
             repaired by `zapdesk sync` or a retry"
        );
        return Ok(());
    };

    if let Some(qr) = &record.qr_code {
        println!("scan this QR code to pair:\n{qr}");
    }

    // Foreground pairing wait; the webhook path may beat us, which is fine.
    let poller = ConnectionPoller::new(
        gateway,
        db.clone(),
        PollerSettings {
            interval: config.poller.interval(),
            timeout: config.poller.timeout(),
        },
    );
    match poller
        .run(&record.id, gateway_id, CancellationToken::new())
        .await?
    {
        PollOutcome::Connected => {
            let connected = instances::get_instance(&db, &record.id).await?;
            let phone = connected
                .and_then(|r| r.phone)
                .unwrap_or_else(|| "unknown".to_string());
            println!("instance connected (phone {phone})");
        }
        PollOutcome::TimedOut => {
            println!(
                "pairing timed out after {}s; run `zapdesk refresh-qr --id {}` to retry",
                config.poller.timeout_secs, record.id
            );
        }
        PollOutcome::Cancelled => {}
    }
    Ok(())
}

/// `zapdesk delete`
pub async fn run_delete(config: ZapdeskConfig, id: &str) -> Result<(), ZapdeskError> {
    let (db, gateway) = open_clients(&config).await?;
    let orchestrator = Orchestrator::new(gateway, db, Arc::new(TaskRegistry::new()));
    orchestrator.delete_instance(id).await?;
    println!("instance {id} deleted");
    Ok(())
}

/// `zapdesk refresh-qr`
pub async fn run_refresh_qr(config: ZapdeskConfig, id: &str) -> Result<(), ZapdeskError> {
    let (db, gateway) = open_clients(&config).await?;
    let orchestrator = Orchestrator::new(gateway, db, Arc::new(TaskRegistry::new()));
    match orchestrator.refresh_qr(id).await? {
        QrRefresh::AlreadyConnected => println!("instance is already connected"),
        QrRefresh::Waiting => println!("gateway has not produced a QR code yet; try again shortly"),
        QrRefresh::Qr(qr) => println!("scan this QR code to pair:\n{qr}"),
    }
    Ok(())
}

/// `zapdesk sync` -- analysis by default, mutations only with `--apply`.
pub async fn run_sync(
    config: ZapdeskConfig,
    tenant_id: &str,
    apply: bool,
) -> Result<(), ZapdeskError> {
    let (db, gateway) = open_clients(&config).await?;
    let reconciler = Reconciler::new(gateway, db, config.reconcile.grace_window());

    let plan = reconciler.analyze(tenant_id).await?;
    println!(
        "scan for tenant {tenant_id}: {} matched, {} adoptable, {} stale",
        plan.matched,
        plan.adoptable().count(),
        plan.stale.len()
    );
    for candidate in plan.adoptable() {
        println!(
            "  adoptable: gateway session {} (phone {}, status {})",
            candidate.gateway_instance_id,
            candidate.reported_phone.as_deref().unwrap_or("unknown"),
            candidate.reported_status
        );
    }
    for record in &plan.stale {
        println!(
            "  stale: `{}` (id {}, created {})",
            record.instance_name, record.id, record.created_at
        );
    }

    if !apply {
        println!("no changes applied; re-run with --apply to adopt/clean up");
        return Ok(());
    }

    let summary = reconciler.execute(tenant_id, &plan).await;
    println!(
        "applied: {} adopted, {} deleted, {} skipped, {} errors",
        summary.adopted,
        summary.deleted,
        summary.skipped,
        summary.errors.len()
    );
    for error in &summary.errors {
        println!("  error: {error}");
    }
    Ok(())
}

/// `zapdesk status`
pub async fn run_status(config: ZapdeskConfig, tenant_id: &str) -> Result<(), ZapdeskError> {
    let db = Database::open(&config.storage.database_path).await?;
    let records = instances::list_by_tenant(&db, tenant_id).await?;

    if records.is_empty() {
        println!("no instances for tenant {tenant_id}");
        return Ok(());
    }

    for record in records {
        println!(
            "{}\t{}\t{}\tphone={}\tgateway={}",
            record.id,
            record.instance_name,
            record.connection_status,
            record.phone.as_deref().unwrap_or("-"),
            record.gateway_instance_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
