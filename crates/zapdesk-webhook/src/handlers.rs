// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for gateway-pushed events.
//!
//! All handlers are idempotent: re-delivery of the same event never
//! corrupts state. Events for sessions with no repository record are
//! acknowledged and dropped -- that is a normal race during phase-B
//! creation, not an error.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use zapdesk_core::types::{ConnectionStatus, ConnectionUpdate, Instance, now_iso};
use zapdesk_storage::queries::instances;

use crate::server::WebhookState;

/// Inbound event body posted by the gateway.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    /// Event type: `ready`, `qr.update`, `messages.upsert`, ...
    pub event: String,
    pub gateway_instance_id: String,
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

/// Acknowledgement body for processed or ignored events.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

impl WebhookAck {
    fn accepted() -> Response {
        (StatusCode::OK, Json(WebhookAck { status: "accepted" })).into_response()
    }

    fn ignored() -> Response {
        (StatusCode::OK, Json(WebhookAck { status: "ignored" })).into_response()
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /health
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /webhook
///
/// Responds 200 for accepted-and-processed as well as for events that are
/// deliberately ignored; 4xx is reserved for malformed payloads.
pub async fn post_webhook(
    State(state): State<WebhookState>,
    Json(event): Json<WebhookEvent>,
) -> Response {
    if event.gateway_instance_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "gatewayInstanceId is required".to_string(),
            }),
        )
            .into_response();
    }

    let record = match instances::find_by_gateway_id(&state.db, &event.gateway_instance_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            // The gateway may report events for sessions not yet linked
            // (phase B still in flight) or already deleted.
            debug!(
                gateway_instance_id = %event.gateway_instance_id,
                event = %event.event,
                "event for unknown session, ignoring"
            );
            return WebhookAck::ignored();
        }
        Err(e) => {
            error!(error = %e, "webhook lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "lookup failed".to_string(),
                }),
            )
                .into_response();
        }
    };

    let event_type = event.event.clone();
    match event_type.as_str() {
        "ready" => handle_ready(&state, &record, event).await,
        "qr.update" => handle_qr_update(&state, &record, event).await,
        "messages.upsert" => {
            // Message ingest belongs to the messaging subsystem; the sync
            // engine only acknowledges delivery.
            debug!(instance_id = %record.id, "message event handed off");
            WebhookAck::accepted()
        }
        other => {
            debug!(instance_id = %record.id, event = other, "unhandled event type");
            WebhookAck::ignored()
        }
    }
}

/// Gateway confirms the session is paired and open.
async fn handle_ready(state: &WebhookState, record: &Instance, event: WebhookEvent) -> Response {
    let mut update = ConnectionUpdate::connected(Some("open".to_string()));
    update.phone = event.phone;
    update.profile_name = event.profile_name;
    update.profile_pic_url = event.profile_pic_url;
    // date_connected is set exactly once, on the first connect.
    if record.date_connected.is_none() {
        update.date_connected = Some(now_iso());
    }

    match instances::update_connection_state(&state.db, &record.id, &update).await {
        Ok(_) => {
            debug!(instance_id = %record.id, "instance connected (observed by webhook)");
            WebhookAck::accepted()
        }
        Err(e) => {
            error!(instance_id = %record.id, error = %e, "failed to apply ready event");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "update failed".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Gateway rotated the pairing QR code.
async fn handle_qr_update(
    state: &WebhookState,
    record: &Instance,
    event: WebhookEvent,
) -> Response {
    // A stale QR push must never downgrade a connected instance. The
    // repository guard enforces this too; checking here keeps the ack
    // honest about what happened.
    if record.connection_status == ConnectionStatus::Connected {
        debug!(instance_id = %record.id, "stale QR push for connected instance, ignoring");
        return WebhookAck::ignored();
    }

    let Some(qr) = event.qr_code else {
        warn!(instance_id = %record.id, "qr.update without a code, ignoring");
        return WebhookAck::ignored();
    };

    match instances::update_connection_state(&state.db, &record.id, &ConnectionUpdate::qr_ready(qr))
        .await
    {
        Ok(_) => WebhookAck::accepted(),
        Err(e) => {
            error!(instance_id = %record.id, error = %e, "failed to apply qr.update event");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "update failed".to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::WebhookAuth;
    use tempfile::tempdir;
    use zapdesk_storage::Database;

    async fn setup() -> (WebhookState, Database, Instance, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("webhook.db").to_str().unwrap())
            .await
            .unwrap();
        let record = Instance::reservation("t1", "sales");
        instances::create_instance(&db, &record).await.unwrap();
        instances::update_gateway_link(&db, &record.id, "gw-sales")
            .await
            .unwrap();
        let state = WebhookState {
            db: db.clone(),
            auth: WebhookAuth { token: None },
        };
        (state, db, record, dir)
    }

    fn ready_event() -> WebhookEvent {
        WebhookEvent {
            event: "ready".into(),
            gateway_instance_id: "gw-sales".into(),
            qr_code: None,
            phone: Some("+5511999".into()),
            profile_name: Some("Sales Desk".into()),
            profile_pic_url: Some("https://cdn.example.com/pic.jpg".into()),
        }
    }

    #[test]
    fn event_body_parses_camel_case() {
        let json = r#"{
            "event": "qr.update",
            "gatewayInstanceId": "gw-1",
            "qrCode": "QR9"
        }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event, "qr.update");
        assert_eq!(event.gateway_instance_id, "gw-1");
        assert_eq!(event.qr_code.as_deref(), Some("QR9"));
        assert!(event.phone.is_none());
    }

    #[tokio::test]
    async fn ready_event_connects_and_fills_profile() {
        let (state, db, record, _dir) = setup().await;

        let response = post_webhook(State(state), Json(ready_event())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = instances::get_instance(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(stored.connection_status, ConnectionStatus::Connected);
        assert_eq!(stored.phone.as_deref(), Some("+5511999"));
        assert_eq!(stored.profile_name.as_deref(), Some("Sales Desk"));
        assert!(stored.qr_code.is_none());
        assert!(stored.date_connected.is_some());
    }

    #[tokio::test]
    async fn ready_event_is_idempotent() {
        let (state, db, record, _dir) = setup().await;

        post_webhook(State(state.clone()), Json(ready_event())).await;
        let first = instances::get_instance(&db, &record.id).await.unwrap().unwrap();

        post_webhook(State(state), Json(ready_event())).await;
        let second = instances::get_instance(&db, &record.id).await.unwrap().unwrap();

        assert_eq!(first.connection_status, second.connection_status);
        assert_eq!(first.phone, second.phone);
        assert_eq!(first.profile_name, second.profile_name);
        assert_eq!(
            first.date_connected, second.date_connected,
            "date_connected is set once and must survive re-delivery"
        );
    }

    #[tokio::test]
    async fn qr_update_stores_code_while_pairing() {
        let (state, db, record, _dir) = setup().await;
        let event = WebhookEvent {
            event: "qr.update".into(),
            gateway_instance_id: "gw-sales".into(),
            qr_code: Some("QR-FRESH".into()),
            phone: None,
            profile_name: None,
            profile_pic_url: None,
        };

        let response = post_webhook(State(state), Json(event)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = instances::get_instance(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(stored.connection_status, ConnectionStatus::QrReady);
        assert_eq!(stored.qr_code.as_deref(), Some("QR-FRESH"));
    }

    #[tokio::test]
    async fn stale_qr_update_never_downgrades_connected() {
        let (state, db, record, _dir) = setup().await;
        post_webhook(State(state.clone()), Json(ready_event())).await;

        let stale = WebhookEvent {
            event: "qr.update".into(),
            gateway_instance_id: "gw-sales".into(),
            qr_code: Some("QR-STALE".into()),
            phone: None,
            profile_name: None,
            profile_pic_url: None,
        };
        let response = post_webhook(State(state), Json(stale)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = instances::get_instance(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(stored.connection_status, ConnectionStatus::Connected);
        assert!(stored.qr_code.is_none());
    }

    #[tokio::test]
    async fn unknown_session_is_acknowledged_and_ignored() {
        let (state, _db, _record, _dir) = setup().await;
        let event = WebhookEvent {
            event: "ready".into(),
            gateway_instance_id: "gw-unlinked".into(),
            qr_code: None,
            phone: None,
            profile_name: None,
            profile_pic_url: None,
        };

        let response = post_webhook(State(state), Json(event)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn message_events_are_acknowledged() {
        let (state, db, record, _dir) = setup().await;
        let event = WebhookEvent {
            event: "messages.upsert".into(),
            gateway_instance_id: "gw-sales".into(),
            qr_code: None,
            phone: None,
            profile_name: None,
            profile_pic_url: None,
        };

        let response = post_webhook(State(state), Json(event)).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Connection state is untouched by message traffic.
        let stored = instances::get_instance(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(stored.connection_status, ConnectionStatus::Connecting);
    }

    #[tokio::test]
    async fn empty_gateway_id_is_a_bad_request() {
        let (state, _db, _record, _dir) = setup().await;
        let event = WebhookEvent {
            event: "ready".into(),
            gateway_instance_id: String::new(),
            qr_code: None,
            phone: None,
            profile_name: None,
            profile_pic_url: None,
        };

        let response = post_webhook(State(state), Json(event)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
