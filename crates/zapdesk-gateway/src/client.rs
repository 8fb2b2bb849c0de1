// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the device gateway.
//!
//! Thin wrapper over the gateway's REST surface. Every call is bounded by
//! the configured timeout and classifies failures three ways: success,
//! recoverable (timeout, connection failure, 5xx), and unrecoverable (4xx).
//! The client never retries internally; retry policy is the caller's.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::debug;

use zapdesk_core::types::{
    CreatedInstance, GatewayHealth, GatewaySession, GatewayState, QrPoll,
};
use zapdesk_core::{GatewayApi, ZapdeskError};

use crate::types::{
    CreateInstanceRequest, CreateInstanceResponse, HealthResponse, QrResponse, SessionEntry,
    StatusResponse,
};

/// Default per-request timeout when the config does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);

/// Authenticated HTTP client for the device gateway REST API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GatewayClient {
    /// Create a new gateway client.
    ///
    /// The bearer token is process-wide configuration and is attached to
    /// every request as a default header.
    pub fn new(base_url: &str, api_token: &str, timeout: Duration) -> Result<Self, ZapdeskError> {
        if api_token.is_empty() {
            return Err(ZapdeskError::Config(
                "gateway.api_token is required and cannot be empty".into(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_token}")).map_err(|e| {
                ZapdeskError::Config(format!("invalid gateway api_token header value: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ZapdeskError::GatewayUnreachable {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(GatewayClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn transport_error(&self, e: reqwest::Error) -> ZapdeskError {
        if e.is_timeout() {
            ZapdeskError::Timeout {
                duration: self.timeout,
            }
        } else {
            ZapdeskError::GatewayUnreachable {
                message: format!("gateway request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }

    /// Split a non-success response into the rejected/unreachable taxonomy.
    async fn status_error(response: reqwest::Response) -> ZapdeskError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            ZapdeskError::GatewayRejected {
                status: status.as_u16(),
                message: body,
            }
        } else {
            ZapdeskError::GatewayUnreachable {
                message: format!("gateway returned {status}: {body}"),
                source: None,
            }
        }
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ZapdeskError> {
        let body = response
            .text()
            .await
            .map_err(|e| ZapdeskError::GatewayUnreachable {
                message: format!("failed to read gateway response body: {e}"),
                source: Some(Box::new(e)),
            })?;
        serde_json::from_str(&body).map_err(|e| {
            ZapdeskError::Internal(format!("failed to parse gateway response: {e}: {body}"))
        })
    }
}

#[async_trait]
impl GatewayApi for GatewayClient {
    async fn check_health(&self) -> Result<GatewayHealth, ZapdeskError> {
        let started = Instant::now();
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        if !response.status().is_success() {
            debug!(status = %response.status(), "gateway health probe not ok");
            return Ok(GatewayHealth {
                online: false,
                latency_ms,
                version: None,
            });
        }

        let body: HealthResponse = Self::parse_json(response).await?;
        Ok(GatewayHealth {
            online: true,
            latency_ms,
            version: body.version,
        })
    }

    async fn create_instance(&self, name: &str) -> Result<CreatedInstance, ZapdeskError> {
        let response = self
            .client
            .post(self.url("/instance/create"))
            .json(&CreateInstanceRequest {
                instance_name: name.to_string(),
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: CreateInstanceResponse = Self::parse_json(response).await?;
        debug!(gateway_instance_id = %body.gateway_instance_id, "gateway instance created");
        Ok(CreatedInstance {
            gateway_instance_id: body.gateway_instance_id,
            qr_code: body.qr_code,
        })
    }

    async fn get_connection_state(
        &self,
        gateway_instance_id: &str,
    ) -> Result<GatewayState, ZapdeskError> {
        let response = self
            .client
            .get(self.url(&format!("/instance/{gateway_instance_id}/status")))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: StatusResponse = Self::parse_json(response).await?;
        Ok(GatewayState::parse_lossy(&body.state))
    }

    async fn get_qr_code(&self, gateway_instance_id: &str) -> Result<QrPoll, ZapdeskError> {
        let response = self
            .client
            .get(self.url(&format!("/instance/{gateway_instance_id}/qr")))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: QrResponse = Self::parse_json(response).await?;
        Ok(QrPoll {
            qr_code: body.qr_code,
            waiting: body.waiting,
        })
    }

    async fn list_instances(&self) -> Result<Vec<GatewaySession>, ZapdeskError> {
        let response = self
            .client
            .get(self.url("/instances"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let entries: Vec<SessionEntry> = Self::parse_json(response).await?;
        Ok(entries
            .into_iter()
            .map(|entry| GatewaySession {
                gateway_instance_id: entry.gateway_instance_id,
                phone: entry.phone,
                status: entry.status.unwrap_or_else(|| "unknown".to_string()),
                name: entry.name,
            })
            .collect())
    }

    async fn delete_instance(&self, gateway_instance_id: &str) -> Result<(), ZapdeskError> {
        let response = self
            .client
            .delete(self.url(&format!("/instance/{gateway_instance_id}")))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        // A session that is already gone counts as deleted.
        if response.status() == StatusCode::NOT_FOUND {
            debug!(gateway_instance_id, "gateway session already gone");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        Ok(())
    }
}
