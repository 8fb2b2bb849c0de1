// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound webhook server for the Zapdesk sync engine.
//!
//! Receives asynchronous gateway push events (`ready`, `qr.update`,
//! `messages.upsert`) and applies idempotent state transitions to the
//! instance repository. This path races the connection poller on the same
//! records; both go through the repository's monotonic partial update, so
//! either may win.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::WebhookAuth;
pub use handlers::WebhookEvent;
pub use server::{router, serve, WebhookState};
