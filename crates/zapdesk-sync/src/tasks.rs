// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-instance background task registry.
//!
//! Each instance may carry at most one poller task and one monitor task.
//! Registering over an occupied slot cancels the previous task, so a
//! "refresh QR" or "reconnect" request never leaks a duplicate timer. The
//! deletion path cancels both slots before the record is removed.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// The kinds of background tasks tied to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Poller,
    Monitor,
}

struct TaskSlot {
    token: CancellationToken,
    generation: u64,
}

/// Registry of cancellation tokens keyed by (task kind, instance id).
#[derive(Default)]
pub struct TaskRegistry {
    slots: DashMap<(TaskKind, String), TaskSlot>,
    next_generation: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for a new task, cancelling any previous occupant.
    ///
    /// Returns the token the task must watch and a generation used to
    /// release the slot without clobbering a later replacement.
    pub fn register(&self, kind: TaskKind, instance_id: &str) -> (CancellationToken, u64) {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let slot = TaskSlot {
            token: token.clone(),
            generation,
        };
        if let Some(previous) = self.slots.insert((kind, instance_id.to_string()), slot) {
            previous.token.cancel();
        }
        (token, generation)
    }

    /// Drop the slot when a task finishes, but only if it still owns it.
    pub fn release(&self, kind: TaskKind, instance_id: &str, generation: u64) {
        self.slots
            .remove_if(&(kind, instance_id.to_string()), |_, slot| {
                slot.generation == generation
            });
    }

    /// Cancel one task. Returns whether a task was registered.
    pub fn cancel(&self, kind: TaskKind, instance_id: &str) -> bool {
        match self.slots.remove(&(kind, instance_id.to_string())) {
            Some((_, slot)) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every task tied to an instance.
    pub fn cancel_instance(&self, instance_id: &str) {
        for kind in [TaskKind::Poller, TaskKind::Monitor] {
            self.cancel(kind, instance_id);
        }
    }

    /// Cancel every registered task (process shutdown).
    pub fn cancel_all(&self) {
        for entry in self.slots.iter() {
            entry.value().token.cancel();
        }
        self.slots.clear();
    }

    /// Whether a task currently holds the slot.
    pub fn is_active(&self, kind: TaskKind, instance_id: &str) -> bool {
        self.slots.contains_key(&(kind, instance_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_replaces_and_cancels_previous() {
        let registry = TaskRegistry::new();
        let (first, _) = registry.register(TaskKind::Poller, "inst-1");
        assert!(!first.is_cancelled());

        let (second, _) = registry.register(TaskKind::Poller, "inst-1");
        assert!(first.is_cancelled(), "replaced task must be cancelled");
        assert!(!second.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn kinds_do_not_collide() {
        let registry = TaskRegistry::new();
        let (poller, _) = registry.register(TaskKind::Poller, "inst-1");
        let (_monitor, _) = registry.register(TaskKind::Monitor, "inst-1");
        assert!(!poller.is_cancelled());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn release_ignores_stale_generation() {
        let registry = TaskRegistry::new();
        let (_, old_generation) = registry.register(TaskKind::Poller, "inst-1");
        let (current, _) = registry.register(TaskKind::Poller, "inst-1");

        // The replaced task finishing must not evict its successor.
        registry.release(TaskKind::Poller, "inst-1", old_generation);
        assert!(registry.is_active(TaskKind::Poller, "inst-1"));
        assert!(!current.is_cancelled());
    }

    #[test]
    fn cancel_all_sweeps_every_slot() {
        let registry = TaskRegistry::new();
        let (a, _) = registry.register(TaskKind::Poller, "inst-1");
        let (b, _) = registry.register(TaskKind::Monitor, "inst-2");

        registry.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_instance_clears_both_kinds() {
        let registry = TaskRegistry::new();
        let (poller, _) = registry.register(TaskKind::Poller, "inst-1");
        let (monitor, _) = registry.register(TaskKind::Monitor, "inst-1");
        let (other, _) = registry.register(TaskKind::Monitor, "inst-2");

        registry.cancel_instance("inst-1");
        assert!(poller.is_cancelled());
        assert!(monitor.is_cancelled());
        assert!(!other.is_cancelled());
        assert_eq!(registry.len(), 1);
    }
}
