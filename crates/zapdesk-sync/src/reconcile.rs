// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orphan reconciliation between the gateway inventory and the repository.
//!
//! A sweep reads a full snapshot of both sides, classifies mismatches, and
//! only then (and only when asked) mutates. Analysis never writes; the
//! apply pass re-validates each stale record immediately before deleting it
//! because the snapshot may have gone stale while earlier candidates were
//! processed. Per-candidate failures are collected, never raised -- the
//! sweep is best-effort convergence, not a transaction.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use zapdesk_core::types::{ConnectionStatus, Instance, now_iso};
use zapdesk_core::{GatewayApi, ZapdeskError};
use zapdesk_storage::queries::instances;
use zapdesk_storage::Database;

use crate::orchestrator::normalize_name;

/// One gateway session observed during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanCandidate {
    pub gateway_instance_id: String,
    pub reported_phone: Option<String>,
    pub reported_status: String,
    pub reported_name: Option<String>,
    /// Repository record linked to this session, if any (any tenant).
    pub matched_record_id: Option<String>,
}

/// Classification result of one sweep, before any mutation.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Every session the gateway reported, with its match state.
    pub candidates: Vec<OrphanCandidate>,
    /// Repository records with no gateway link, older than the grace window.
    pub stale: Vec<Instance>,
    /// Sessions matched to a record of the requested tenant.
    pub matched: usize,
}

impl ReconcilePlan {
    /// Sessions with no owning record anywhere: candidates for adoption.
    pub fn adoptable(&self) -> impl Iterator<Item = &OrphanCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.matched_record_id.is_none())
    }
}

/// Counters reported by an apply pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub adopted: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Compares gateway inventory against repository records for a tenant and
/// optionally repairs the differences.
pub struct Reconciler {
    gateway: Arc<dyn GatewayApi>,
    db: Database,
    grace_window: Duration,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn GatewayApi>, db: Database, grace_window: Duration) -> Self {
        Reconciler {
            gateway,
            db,
            grace_window,
        }
    }

    /// Classify without mutating (the dry-run mode).
    pub async fn analyze(&self, tenant_id: &str) -> Result<ReconcilePlan, ZapdeskError> {
        let sessions = self.gateway.list_instances().await?;
        let mut plan = ReconcilePlan::default();

        for session in sessions {
            let matched =
                instances::find_by_gateway_id(&self.db, &session.gateway_instance_id).await?;
            if let Some(record) = &matched
                && record.tenant_id == tenant_id
            {
                plan.matched += 1;
            }
            plan.candidates.push(OrphanCandidate {
                gateway_instance_id: session.gateway_instance_id,
                reported_phone: session.phone,
                reported_status: session.status,
                reported_name: session.name,
                matched_record_id: matched.map(|record| record.id),
            });
        }

        plan.stale =
            instances::find_orphaned_records(&self.db, tenant_id, self.grace_window.as_secs())
                .await?;

        info!(
            tenant_id,
            matched = plan.matched,
            adoptable = plan.adoptable().count(),
            stale = plan.stale.len(),
            "reconciliation scan complete"
        );
        Ok(plan)
    }

    /// Scan and repair in one pass.
    pub async fn apply(&self, tenant_id: &str) -> Result<ReconcileSummary, ZapdeskError> {
        let plan = self.analyze(tenant_id).await?;
        Ok(self.execute(tenant_id, &plan).await)
    }

    /// Execute the mutations a plan calls for.
    ///
    /// Exposed separately so callers can show the plan to an operator before
    /// confirming.
    pub async fn execute(&self, tenant_id: &str, plan: &ReconcilePlan) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for candidate in plan.adoptable() {
            match self.adopt(tenant_id, candidate).await {
                Ok(record) => {
                    info!(
                        tenant_id,
                        instance_id = %record.id,
                        gateway_instance_id = %candidate.gateway_instance_id,
                        "adopted gateway session"
                    );
                    summary.adopted += 1;
                }
                Err(e @ ZapdeskError::ReconciliationConflict { .. }) => {
                    warn!(tenant_id, error = %e, "skipping adoption candidate");
                    summary.skipped += 1;
                    summary.errors.push(e.to_string());
                }
                Err(e) => {
                    warn!(tenant_id, error = %e, "adoption failed");
                    summary.errors.push(format!(
                        "adoption of {} failed: {e}",
                        candidate.gateway_instance_id
                    ));
                }
            }
        }

        for record in &plan.stale {
            match self.delete_stale(record).await {
                Ok(true) => {
                    info!(
                        tenant_id,
                        instance_id = %record.id,
                        "removed stale reservation"
                    );
                    summary.deleted += 1;
                }
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    warn!(tenant_id, instance_id = %record.id, error = %e, "cleanup failed");
                    summary
                        .errors
                        .push(format!("cleanup of {} failed: {e}", record.id));
                }
            }
        }

        summary
    }

    /// Create a repository record for a gateway session that has no owner.
    async fn adopt(
        &self,
        tenant_id: &str,
        candidate: &OrphanCandidate,
    ) -> Result<Instance, ZapdeskError> {
        let raw_name = candidate
            .reported_name
            .clone()
            .unwrap_or_else(|| format!("adopted-{}", candidate.gateway_instance_id));
        let name = normalize_name(&raw_name)?;

        let mut record = Instance::reservation(tenant_id, &name);
        record.gateway_instance_id = Some(candidate.gateway_instance_id.clone());
        record.gateway_status = Some(candidate.reported_status.clone());
        record.phone = candidate.reported_phone.clone();
        if candidate.reported_status == "open" {
            record.connection_status = ConnectionStatus::Connected;
            record.date_connected = Some(now_iso());
        } else {
            record.connection_status = ConnectionStatus::Disconnected;
        }

        instances::create_instance(&self.db, &record)
            .await
            .map_err(|e| match e {
                ZapdeskError::DuplicateName { name, .. } => ZapdeskError::ReconciliationConflict {
                    gateway_instance_id: candidate.gateway_instance_id.clone(),
                    reason: format!("name `{name}` is already in use"),
                },
                other => other,
            })?;
        Ok(record)
    }

    /// Delete a stale reservation, re-validating against the live row first.
    async fn delete_stale(&self, record: &Instance) -> Result<bool, ZapdeskError> {
        let Some(current) = instances::get_instance(&self.db, &record.id).await? else {
            return Ok(false);
        };
        // A creation may have finished (or a sweep raced us) since the scan.
        if current.has_gateway_link() || !self.outside_grace(&current) {
            return Ok(false);
        }
        instances::delete_instance(&self.db, &record.id).await
    }

    fn outside_grace(&self, record: &Instance) -> bool {
        let Ok(grace) = chrono::Duration::from_std(self.grace_window) else {
            return false;
        };
        match chrono::DateTime::parse_from_rfc3339(&record.created_at) {
            Ok(created) => chrono::Utc::now().signed_duration_since(created) >= grace,
            // An unparseable timestamp is never grounds for deletion.
            Err(_) => false,
        }
    }
}
