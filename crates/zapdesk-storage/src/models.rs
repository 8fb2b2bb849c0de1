// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types live in `zapdesk-core::types` so every component
//! shares one vocabulary; this module re-exports them for convenience
//! within the storage crate.

pub use zapdesk_core::types::{ConnectionStatus, ConnectionUpdate, Instance};
