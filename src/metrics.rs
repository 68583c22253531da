//! Moderation counters.
//!
//! Lock-free counters for the current process, exposed on the stats endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::executor::ExecutionReport;
use crate::policy::ModerationAction;

/// In-memory counters for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ModerationMetrics {
    messages_processed: AtomicU64,
    commands_handled: AtomicU64,
    hate_detected: AtomicU64,
    classifier_failures: AtomicU64,
    generation_failures: AtomicU64,
    removals: AtomicU64,
    removal_failures: AtomicU64,
    deletions: AtomicU64,
    deletion_failures: AtomicU64,
}

/// Point-in-time copy of [`ModerationMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub messages_processed: u64,
    pub commands_handled: u64,
    pub hate_detected: u64,
    pub classifier_failures: u64,
    pub generation_failures: u64,
    pub removals: u64,
    pub removal_failures: u64,
    pub deletions: u64,
    pub deletion_failures: u64,
}

impl MetricsSnapshot {
    /// Share of processed messages classified as hate (0.0 to 1.0).
    pub fn hate_rate(&self) -> f64 {
        if self.messages_processed == 0 {
            0.0
        } else {
            self.hate_detected as f64 / self.messages_processed as f64
        }
    }
}

impl ModerationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hate(&self) {
        self.hate_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_failure(&self) {
        self.classifier_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count removals and deletions from an executed plan.
    pub fn record_execution(&self, report: &ExecutionReport) {
        for executed in &report.executed {
            let (ok, failed) = match executed.action {
                ModerationAction::RemoveUser(_) => (&self.removals, &self.removal_failures),
                ModerationAction::DeleteMessage => (&self.deletions, &self.deletion_failures),
                ModerationAction::SendText(_) => continue,
            };
            if executed.outcome.is_success() {
                ok.fetch_add(1, Ordering::Relaxed);
            } else {
                failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            commands_handled: self.commands_handled.load(Ordering::Relaxed),
            hate_detected: self.hate_detected.load(Ordering::Relaxed),
            classifier_failures: self.classifier_failures.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            removal_failures: self.removal_failures.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            deletion_failures: self.deletion_failures.load(Ordering::Relaxed),
        }
    }
}
