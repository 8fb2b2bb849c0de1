// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The creation orchestrator: the single owner of the two-phase instance
//! creation protocol, plus deletion and QR refresh.
//!
//! Creation cannot be atomic across the repository and the gateway, so the
//! protocol reserves a database row first (phase A) and provisions the
//! gateway session second (phase B). A recoverable phase-B failure keeps
//! the reservation: the gateway call may have succeeded server-side despite
//! a client-side timeout, and only the reconciliation sweep can tell. An
//! unrecoverable failure rolls the reservation back and surfaces the error.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use zapdesk_core::types::{ConnectionStatus, ConnectionUpdate, Instance};
use zapdesk_core::{GatewayApi, RetryPolicy, ZapdeskError};
use zapdesk_storage::queries::instances;
use zapdesk_storage::Database;

use crate::tasks::TaskRegistry;

/// Outcome of a manual QR refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrRefresh {
    /// The instance is already connected; there is nothing to pair.
    AlreadyConnected,
    /// The gateway has not produced a code yet; try again shortly.
    Waiting,
    /// A fresh pairing code, already stored on the record.
    Qr(String),
}

/// Drives instance creation, deletion, and QR refresh against the
/// repository and the gateway.
pub struct Orchestrator {
    gateway: Arc<dyn GatewayApi>,
    db: Database,
    tasks: Arc<TaskRegistry>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn GatewayApi>, db: Database, tasks: Arc<TaskRegistry>) -> Self {
        Orchestrator {
            gateway,
            db,
            tasks,
            // Phase B gets one bounded retry; anything beyond that is the
            // reconciler's job.
            retry: RetryPolicy::fixed(2, Duration::from_secs(2)),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create an instance for a tenant.
    ///
    /// Returns the record in whatever state it reached: linked and
    /// `qr_ready` on full success, or a bare `connecting` reservation when
    /// the gateway was unreachable. Callers hand the returned record to the
    /// connection poller to await pairing.
    pub async fn create_instance(
        &self,
        tenant_id: &str,
        raw_name: &str,
    ) -> Result<Instance, ZapdeskError> {
        let name = normalize_name(raw_name)?;

        // Phase A: claim the name. The UNIQUE constraint makes this the
        // linearization point for concurrent creations.
        let record = Instance::reservation(tenant_id, &name);
        instances::create_instance(&self.db, &record).await?;
        info!(instance_id = %record.id, tenant_id, name = %name, "instance reserved");

        // Phase B: provision the gateway session.
        match self.retry.run(|_| self.gateway.create_instance(&name)).await {
            Ok(created) => {
                instances::update_gateway_link(&self.db, &record.id, &created.gateway_instance_id)
                    .await?;
                if let Some(qr) = created.qr_code {
                    instances::update_connection_state(
                        &self.db,
                        &record.id,
                        &ConnectionUpdate::qr_ready(qr),
                    )
                    .await?;
                }
                info!(
                    instance_id = %record.id,
                    gateway_instance_id = %created.gateway_instance_id,
                    "instance provisioned"
                );
                instances::get_instance(&self.db, &record.id)
                    .await?
                    .ok_or_else(|| ZapdeskError::NotFound {
                        what: "instance",
                        id: record.id.clone(),
                    })
            }
            Err(e) if e.is_recoverable() => {
                // Never delete the reservation here: the gateway may have
                // created the session even though our call failed.
                warn!(
                    instance_id = %record.id,
                    error = %e,
                    "gateway provisioning failed, keeping reservation for reconciliation"
                );
                Ok(record)
            }
            Err(e) => {
                error!(
                    instance_id = %record.id,
                    error = %e,
                    "gateway rejected provisioning, rolling back reservation"
                );
                instances::delete_instance(&self.db, &record.id).await?;
                Err(e)
            }
        }
    }

    /// Delete an instance: cancel its background tasks, tear down the
    /// gateway session, then remove the row.
    pub async fn delete_instance(&self, id: &str) -> Result<(), ZapdeskError> {
        let record = instances::get_instance(&self.db, id)
            .await?
            .ok_or(ZapdeskError::NotFound {
                what: "instance",
                id: id.to_string(),
            })?;

        // Cancel before the row disappears so no task outlives its instance.
        self.tasks.cancel_instance(id);

        if let Some(gateway_id) = record
            .gateway_instance_id
            .as_deref()
            .filter(|g| !g.is_empty())
        {
            // Best effort: a failed gateway delete leaves an orphaned
            // session for the reconciler to find.
            if let Err(e) = self.gateway.delete_instance(gateway_id).await {
                warn!(
                    instance_id = %id,
                    gateway_instance_id = %gateway_id,
                    error = %e,
                    "gateway delete failed, session left for reconciliation"
                );
            }
        }

        instances::delete_instance(&self.db, id).await?;
        info!(instance_id = %id, tenant_id = %record.tenant_id, "instance deleted");
        Ok(())
    }

    /// Fetch a fresh pairing QR for an unconnected instance.
    pub async fn refresh_qr(&self, id: &str) -> Result<QrRefresh, ZapdeskError> {
        let record = instances::get_instance(&self.db, id)
            .await?
            .ok_or(ZapdeskError::NotFound {
                what: "instance",
                id: id.to_string(),
            })?;

        if record.connection_status == ConnectionStatus::Connected {
            return Ok(QrRefresh::AlreadyConnected);
        }

        let gateway_id = record
            .gateway_instance_id
            .as_deref()
            .filter(|g| !g.is_empty())
            .ok_or(ZapdeskError::NotFound {
                what: "gateway link",
                id: id.to_string(),
            })?;

        let poll = self.gateway.get_qr_code(gateway_id).await?;
        match poll.qr_code {
            Some(qr) => {
                instances::update_connection_state(
                    &self.db,
                    id,
                    &ConnectionUpdate::qr_ready(qr.clone()),
                )
                .await?;
                Ok(QrRefresh::Qr(qr))
            }
            None => Ok(QrRefresh::Waiting),
        }
    }
}

/// Strip unsafe characters and validate that a usable name remains.
///
/// Keeps ASCII alphanumerics plus `-`, `_`, and `.` -- the vocabulary the
/// gateway accepts in session identifiers.
pub fn normalize_name(raw: &str) -> Result<String, ZapdeskError> {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();

    if name.is_empty() {
        return Err(ZapdeskError::InvalidName {
            name: raw.to_string(),
            reason: "no usable characters remain after stripping".into(),
        });
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CreateScript, ScriptedGateway};
    use tempfile::tempdir;

    async fn setup() -> (Orchestrator, Arc<ScriptedGateway>, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("orch.db").to_str().unwrap())
            .await
            .unwrap();
        let gateway = Arc::new(ScriptedGateway::new());
        let orchestrator = Orchestrator::new(gateway.clone(), db.clone(), Arc::new(TaskRegistry::new()))
            .with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(1)));
        (orchestrator, gateway, db, dir)
    }

    #[test]
    fn normalize_name_strips_unsafe_characters() {
        assert_eq!(normalize_name("  Sales Team #1  ").unwrap(), "SalesTeam1");
        assert_eq!(normalize_name("support-br.01").unwrap(), "support-br.01");
        assert!(matches!(
            normalize_name("  @!?  "),
            Err(ZapdeskError::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn create_links_gateway_and_stores_initial_qr() {
        let (orchestrator, gateway, _db, _dir) = setup().await;
        gateway.script_create(CreateScript::Succeed {
            gateway_instance_id: "gw-sales".into(),
            qr_code: Some("QR0".into()),
        });

        let record = orchestrator.create_instance("t1", "sales").await.unwrap();
        assert_eq!(record.gateway_instance_id.as_deref(), Some("gw-sales"));
        assert_eq!(record.connection_status, ConnectionStatus::QrReady);
        assert_eq!(record.qr_code.as_deref(), Some("QR0"));
        assert_eq!(gateway.created_names.lock().unwrap().as_slice(), ["sales"]);
    }

    #[tokio::test]
    async fn duplicate_name_fails_and_keeps_first_record() {
        let (orchestrator, _gateway, db, _dir) = setup().await;
        let first = orchestrator.create_instance("t1", "sales").await.unwrap();

        let err = orchestrator
            .create_instance("t1", "sales")
            .await
            .unwrap_err();
        assert!(matches!(err, ZapdeskError::DuplicateName { .. }));

        let records = instances::list_by_tenant(&db, "t1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, first.id);
    }

    #[tokio::test]
    async fn recoverable_phase_b_failure_keeps_reservation() {
        let (orchestrator, gateway, db, _dir) = setup().await;
        // Both attempts of the bounded retry fail.
        gateway.script_create(CreateScript::Unreachable);
        gateway.script_create(CreateScript::Unreachable);

        let record = orchestrator.create_instance("t1", "sales").await.unwrap();
        assert_eq!(record.connection_status, ConnectionStatus::Connecting);
        assert!(!record.has_gateway_link());

        let stored = instances::get_instance(&db, &record.id).await.unwrap();
        assert!(stored.is_some(), "reservation must survive the failure");
        assert!(!stored.unwrap().has_gateway_link());
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_succeeds() {
        let (orchestrator, gateway, _db, _dir) = setup().await;
        gateway.script_create(CreateScript::Unreachable);
        gateway.script_create(CreateScript::Succeed {
            gateway_instance_id: "gw-second-try".into(),
            qr_code: None,
        });

        let record = orchestrator.create_instance("t1", "sales").await.unwrap();
        assert_eq!(
            record.gateway_instance_id.as_deref(),
            Some("gw-second-try")
        );
        assert_eq!(gateway.created_names.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejection_rolls_back_the_reservation() {
        let (orchestrator, gateway, db, _dir) = setup().await;
        gateway.script_create(CreateScript::Rejected);

        let err = orchestrator
            .create_instance("t1", "sales")
            .await
            .unwrap_err();
        assert!(matches!(err, ZapdeskError::GatewayRejected { .. }));

        let records = instances::list_by_tenant(&db, "t1").await.unwrap();
        assert!(records.is_empty(), "rollback must remove the reservation");

        // The name is free again.
        orchestrator.create_instance("t1", "sales").await.unwrap();
    }

    #[tokio::test]
    async fn create_then_delete_leaves_nothing_behind() {
        let (orchestrator, gateway, db, _dir) = setup().await;
        let record = orchestrator.create_instance("t1", "sales").await.unwrap();
        let gateway_id = record.gateway_instance_id.clone().unwrap();

        orchestrator.delete_instance(&record.id).await.unwrap();

        assert!(instances::get_instance(&db, &record.id).await.unwrap().is_none());
        assert_eq!(gateway.deleted.lock().unwrap().as_slice(), [gateway_id]);
    }

    #[tokio::test]
    async fn delete_without_gateway_link_skips_gateway_call() {
        let (orchestrator, gateway, db, _dir) = setup().await;
        gateway.script_create(CreateScript::Unreachable);
        gateway.script_create(CreateScript::Unreachable);
        let record = orchestrator.create_instance("t1", "sales").await.unwrap();

        orchestrator.delete_instance(&record.id).await.unwrap();

        assert!(gateway.deleted.lock().unwrap().is_empty());
        assert!(instances::get_instance(&db, &record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cancels_registered_tasks() {
        let (orchestrator, _gateway, _db, _dir) = setup().await;
        let record = orchestrator.create_instance("t1", "sales").await.unwrap();

        let (token, _) = orchestrator
            .tasks
            .register(crate::tasks::TaskKind::Poller, &record.id);
        orchestrator.delete_instance(&record.id).await.unwrap();
        assert!(token.is_cancelled());
        assert!(orchestrator.tasks.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_instance_is_not_found() {
        let (orchestrator, _gateway, _db, _dir) = setup().await;
        let err = orchestrator.delete_instance("ghost").await.unwrap_err();
        assert!(matches!(err, ZapdeskError::NotFound { .. }));
    }

    #[tokio::test]
    async fn refresh_qr_short_circuits_when_connected() {
        let (orchestrator, _gateway, db, _dir) = setup().await;
        let record = orchestrator.create_instance("t1", "sales").await.unwrap();
        instances::update_connection_state(&db, &record.id, &ConnectionUpdate::connected(None))
            .await
            .unwrap();

        let result = orchestrator.refresh_qr(&record.id).await.unwrap();
        assert_eq!(result, QrRefresh::AlreadyConnected);
    }

    #[tokio::test]
    async fn refresh_qr_stores_the_new_code() {
        let (orchestrator, gateway, db, _dir) = setup().await;
        let record = orchestrator.create_instance("t1", "sales").await.unwrap();
        gateway.set_qr(Some("QR-NEW"));

        let result = orchestrator.refresh_qr(&record.id).await.unwrap();
        assert_eq!(result, QrRefresh::Qr("QR-NEW".into()));

        let stored = instances::get_instance(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(stored.qr_code.as_deref(), Some("QR-NEW"));
        assert_eq!(stored.connection_status, ConnectionStatus::QrReady);
    }

    #[tokio::test]
    async fn refresh_qr_reports_waiting() {
        let (orchestrator, gateway, _db, _dir) = setup().await;
        let record = orchestrator.create_instance("t1", "sales").await.unwrap();
        gateway.set_qr(None);

        let result = orchestrator.refresh_qr(&record.id).await.unwrap();
        assert_eq!(result, QrRefresh::Waiting);
    }
}
