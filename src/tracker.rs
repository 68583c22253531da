//! Per-user offense counting.
//!
//! Counts live in memory for the lifetime of the process. Every operation is
//! safe to call from concurrent event handlers.

use std::sync::Arc;

use dashmap::DashMap;
use serenity::model::id::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard serializing the moderation cycle of a single user.
///
/// Dropping the last guard for a user removes that user's gate, so the gate
/// map only holds users with a cycle in flight or waiting.
pub struct UserGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    gates: &'a DashMap<UserId, Arc<Mutex<()>>>,
    user_id: UserId,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the gate, so it is only removed when idle.
        self.gates
            .remove_if(&self.user_id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

/// Process-wide offense counts keyed by user.
#[derive(Default)]
pub struct OffenseTracker {
    counts: DashMap<UserId, u32>,
    gates: DashMap<UserId, Arc<Mutex<()>>>,
}

impl OffenseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count, 0 for unseen users.
    pub fn get(&self, user_id: UserId) -> u32 {
        self.counts.get(&user_id).map(|c| *c).unwrap_or(0)
    }

    /// Increment and return the post-increment count.
    pub fn increment(&self, user_id: UserId) -> u32 {
        let mut count = self.counts.entry(user_id).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Set the count back to 0.
    pub fn reset(&self, user_id: UserId) {
        self.counts.insert(user_id, 0);
    }

    /// Number of users that have ever been counted.
    pub fn tracked_users(&self) -> usize {
        self.counts.len()
    }

    /// Wait for exclusive access to one user's moderation cycle.
    ///
    /// Waiters are served in arrival order, so messages from the same user
    /// are scored and acted on in the order they were received.
    pub async fn lock_user(&self, user_id: UserId) -> UserGuard<'_> {
        let gate = self
            .gates
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        UserGuard {
            guard: Some(gate.lock_owned().await),
            gates: &self.gates,
            user_id,
        }
    }

    /// Number of users with a moderation cycle in flight or waiting.
    pub fn active_gates(&self) -> usize {
        self.gates.len()
    }
}
