// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP server built on axum.
//!
//! Routes:
//! - `GET /health` -- public liveness probe.
//! - `POST /webhook` -- gateway event ingest, bearer-guarded when a token
//!   is configured.

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use zapdesk_core::ZapdeskError;
use zapdesk_storage::Database;

use crate::auth::{auth_middleware, WebhookAuth};
use crate::handlers;

/// Shared state for webhook request handlers.
#[derive(Clone)]
pub struct WebhookState {
    pub db: Database,
    pub auth: WebhookAuth,
}

/// Build the webhook router.
pub fn router(state: WebhookState) -> Router {
    let public_routes = Router::new().route("/health", get(handlers::get_health));

    let ingest_routes = Router::new()
        .route("/webhook", post(handlers::post_webhook))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(ingest_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve the webhook endpoint until `shutdown` fires.
pub async fn serve(
    addr: &str,
    state: WebhookState,
    shutdown: CancellationToken,
) -> Result<(), ZapdeskError> {
    let app = router(state);
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ZapdeskError::Internal(format!(
                "failed to bind webhook server to {addr}: {e}"
            )))?;

    tracing::info!("webhook server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ZapdeskError::Internal(format!("webhook server error: {e}")))?;

    Ok(())
}
