// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance repository CRUD operations.
//!
//! All operations that back user-facing flows are tenant-scoped. The
//! webhook path looks records up by gateway id across tenants because
//! gateway events carry no tenant context.

use rusqlite::params;
use zapdesk_core::types::{ConnectionStatus, ConnectionUpdate, Instance};
use zapdesk_core::ZapdeskError;

use crate::database::{map_tr_err, Database};

const INSTANCE_COLUMNS: &str = "id, tenant_id, instance_name, gateway_instance_id, \
     connection_status, gateway_status, qr_code, phone, profile_name, \
     profile_pic_url, date_connected, created_at, updated_at";

fn row_to_instance(row: &rusqlite::Row<'_>) -> Result<Instance, rusqlite::Error> {
    let status_raw: String = row.get(4)?;
    let connection_status: ConnectionStatus = status_raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Instance {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        instance_name: row.get(2)?,
        gateway_instance_id: row.get(3)?,
        connection_status,
        gateway_status: row.get(5)?,
        qr_code: row.get(6)?,
        phone: row.get(7)?,
        profile_name: row.get(8)?,
        profile_pic_url: row.get(9)?,
        date_connected: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Insert a new instance record.
///
/// A UNIQUE(tenant_id, instance_name) violation surfaces as
/// [`ZapdeskError::DuplicateName`]; under concurrent creation attempts with
/// the same name, exactly one insert wins.
pub async fn create_instance(db: &Database, record: &Instance) -> Result<(), ZapdeskError> {
    let record = record.clone();
    let tenant_id = record.tenant_id.clone();
    let name = record.instance_name.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO instances (id, tenant_id, instance_name, gateway_instance_id,
                     connection_status, gateway_status, qr_code, phone, profile_name,
                     profile_pic_url, date_connected, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.id,
                    record.tenant_id,
                    record.instance_name,
                    record.gateway_instance_id,
                    record.connection_status.to_string(),
                    record.gateway_status,
                    record.qr_code,
                    record.phone,
                    record.profile_name,
                    record.profile_pic_url,
                    record.date_connected,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ZapdeskError::DuplicateName { tenant_id, name }
            }
            other => map_tr_err(other),
        })
}

/// Get an instance by its internal id.
pub async fn get_instance(db: &Database, id: &str) -> Result<Option<Instance>, ZapdeskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_instance) {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Find the record linked to a gateway session, across all tenants.
pub async fn find_by_gateway_id(
    db: &Database,
    gateway_instance_id: &str,
) -> Result<Option<Instance>, ZapdeskError> {
    let gateway_instance_id = gateway_instance_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances
                 WHERE gateway_instance_id = ?1 AND gateway_instance_id != ''"
            ))?;
            match stmt.query_row(params![gateway_instance_id], row_to_instance) {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List all instances owned by a tenant, newest first.
pub async fn list_by_tenant(db: &Database, tenant_id: &str) -> Result<Vec<Instance>, ZapdeskError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances
                 WHERE tenant_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map(params![tenant_id], row_to_instance)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// List every connected instance across tenants (monitor resumption on boot).
pub async fn list_connected(db: &Database) -> Result<Vec<Instance>, ZapdeskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances
                 WHERE connection_status = 'connected' ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], row_to_instance)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// All tenant ids present in the repository (scheduled sweep enumeration).
pub async fn list_tenants(db: &Database) -> Result<Vec<String>, ZapdeskError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT tenant_id FROM instances ORDER BY tenant_id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut tenants = Vec::new();
            for row in rows {
                tenants.push(row?);
            }
            Ok(tenants)
        })
        .await
        .map_err(map_tr_err)
}

/// Attach the gateway-assigned identifier after phase-B provisioning.
pub async fn update_gateway_link(
    db: &Database,
    id: &str,
    gateway_instance_id: &str,
) -> Result<(), ZapdeskError> {
    let id = id.to_string();
    let gateway_instance_id = gateway_instance_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE instances
                 SET gateway_instance_id = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![gateway_instance_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a partial connection-state update.
///
/// Returns `true` when a row was changed. A `false` return means either the
/// record is gone or the write was dropped by the monotonic guard: once a
/// row is `connected`, writes of `connecting`/`qr_ready` -- and of
/// `disconnected` without the explicit flag -- are stale and must not regress
/// it. This is what lets the poller and the webhook handler race freely on
/// the same record.
pub async fn update_connection_state(
    db: &Database,
    id: &str,
    update: &ConnectionUpdate,
) -> Result<bool, ZapdeskError> {
    let id = id.to_string();
    let update = update.clone();
    db.connection()
        .call(move |conn| {
            let mut sets: Vec<&str> =
                vec!["updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"];
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(status) = update.connection_status {
                sets.push("connection_status = ?");
                values.push(Box::new(status.to_string()));
            }
            if let Some(gateway_status) = update.gateway_status {
                sets.push("gateway_status = ?");
                values.push(Box::new(gateway_status));
            }
            match update.qr_code {
                Some(Some(qr)) => {
                    sets.push("qr_code = ?");
                    values.push(Box::new(qr));
                }
                Some(None) => sets.push("qr_code = NULL"),
                None => {}
            }
            if let Some(phone) = update.phone {
                sets.push("phone = ?");
                values.push(Box::new(phone));
            }
            if let Some(profile_name) = update.profile_name {
                sets.push("profile_name = ?");
                values.push(Box::new(profile_name));
            }
            if let Some(profile_pic_url) = update.profile_pic_url {
                sets.push("profile_pic_url = ?");
                values.push(Box::new(profile_pic_url));
            }
            if let Some(date_connected) = update.date_connected {
                sets.push("date_connected = ?");
                values.push(Box::new(date_connected));
            }

            let is_downgrade = match update.connection_status {
                Some(ConnectionStatus::Connecting) | Some(ConnectionStatus::QrReady) => true,
                Some(ConnectionStatus::Disconnected) => !update.explicit_disconnect,
                _ => false,
            };

            let mut sql = format!(
                "UPDATE instances SET {} WHERE id = ?",
                sets.join(", ")
            );
            values.push(Box::new(id));
            if is_downgrade {
                sql.push_str(" AND connection_status != 'connected'");
            }

            let changed = conn.execute(
                &sql,
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete an instance record. Returns `true` if a row existed.
pub async fn delete_instance(db: &Database, id: &str) -> Result<bool, ZapdeskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM instances WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Records with no gateway link that are older than the grace window.
///
/// The age check keeps in-flight creations (phase B still running or about
/// to be retried) out of the orphan set.
pub async fn find_orphaned_records(
    db: &Database,
    tenant_id: &str,
    grace_secs: u64,
) -> Result<Vec<Instance>, ZapdeskError> {
    let tenant_id = tenant_id.to_string();
    let cutoff_modifier = format!("-{grace_secs} seconds");
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances
                 WHERE tenant_id = ?1
                   AND (gateway_instance_id IS NULL OR gateway_instance_id = '')
                   AND created_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2)
                 ORDER BY created_at"
            ))?;
            let rows = stmt.query_map(params![tenant_id, cutoff_modifier], row_to_instance)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}
