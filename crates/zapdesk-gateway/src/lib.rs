// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device gateway HTTP client for the Zapdesk sync engine.
//!
//! Implements [`zapdesk_core::GatewayApi`] over the gateway's REST
//! surface with bearer-token auth, bounded timeouts, and a strict
//! recoverable/unrecoverable error split. Retry policy lives with the
//! callers, never in here.

pub mod client;
pub mod types;

pub use client::{GatewayClient, DEFAULT_TIMEOUT};
