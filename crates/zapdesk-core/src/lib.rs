// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Zapdesk instance sync engine.
//!
//! Provides the error taxonomy, domain types, the [`GatewayApi`] contract
//! implemented by the real HTTP client and by test stubs, and the shared
//! retry policy used by gateway callers.

pub mod error;
pub mod gateway;
pub mod retry;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ZapdeskError;
pub use gateway::GatewayApi;
pub use retry::{Backoff, RetryPolicy};
pub use types::{
    ConnectionStatus, ConnectionUpdate, CreatedInstance, GatewayHealth, GatewaySession,
    GatewayState, Instance, QrPoll, now_iso,
};
