// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configurable retry policy for gateway callers.
//!
//! One policy object covers both shapes the engine needs: a small fixed
//! delay for provisioning calls, and exponential backoff where a caller
//! wants it. Only recoverable errors are retried; a `GatewayRejected` or
//! validation error aborts the loop immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ZapdeskError;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Bounded retry with fixed or exponential delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            initial_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            initial_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Delay to sleep after `completed` attempts have failed (1-based).
    pub fn delay_after(&self, completed: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.initial_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(completed.saturating_sub(1));
                self.initial_delay.saturating_mul(factor)
            }
        }
    }

    /// Run `op` until it succeeds, fails unrecoverably, or attempts run out.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ZapdeskError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ZapdeskError>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.delay_after(attempt - 1)).await;
            }
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "retrying after recoverable failure");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| ZapdeskError::Internal("retry policy allows zero attempts".into())))
    }
}
