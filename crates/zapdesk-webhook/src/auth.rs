// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token authentication for the webhook endpoint.
//!
//! When `server.webhook_token` is configured the endpoint requires a
//! matching `Authorization: Bearer <token>` header. With no token
//! configured the endpoint stays open -- many gateway deployments cannot
//! attach custom headers to their webhook posts.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Authentication configuration for the webhook endpoint.
#[derive(Clone)]
pub struct WebhookAuth {
    /// Expected bearer token. `None` disables the check.
    pub token: Option<String>,
}

impl std::fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuth")
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Middleware validating the webhook bearer token when one is configured.
pub async fn auth_middleware(
    State(auth): State<WebhookAuth>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = auth.token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => {
            tracing::warn!("webhook request rejected: missing or wrong bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
