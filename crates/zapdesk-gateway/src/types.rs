// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the device gateway REST API.
//!
//! The gateway speaks camelCase JSON; these DTOs stay private to this
//! crate and are mapped onto the core domain types at the client boundary.

use serde::{Deserialize, Serialize};

/// Body for `POST /instance/create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub instance_name: String,
}

/// Response from `POST /instance/create`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceResponse {
    pub gateway_instance_id: String,
    #[serde(default)]
    pub qr_code: Option<String>,
}

/// Response from `GET /instance/{id}/status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub state: String,
}

/// Response from `GET /instance/{id}/qr`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrResponse {
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub waiting: bool,
}

/// One entry of `GET /instances`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub gateway_instance_id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Response from `GET /health`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}
