//! Run-wide completion accounting shared by all workers.
//!
//! `remaining` starts at the planned task count and only ever decreases.
//! The worker whose decrement takes it from 1 to 0 is the only one that
//! receives a [`Verdict`], so the terminal action fires exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::worker::TaskOutcome;

/// Terminal decision for a run that had work to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    AllSucceeded {
        succeeded: usize,
    },
    AbortedOnError {
        failed: usize,
        planned: usize,
        first_error: String,
    },
}

#[derive(Debug)]
pub struct SyncState {
    planned: usize,
    remaining: AtomicUsize,
    failed: AtomicUsize,
    first_error: OnceLock<String>,
}

impl SyncState {
    pub fn new(planned: usize) -> Self {
        Self {
            planned,
            remaining: AtomicUsize::new(planned),
            failed: AtomicUsize::new(0),
            first_error: OnceLock::new(),
        }
    }

    pub fn planned(&self) -> usize {
        self.planned
    }

    /// Account for one terminal task outcome. Returns the verdict only to
    /// the caller that observed the last outstanding task finish.
    pub fn record(&self, filename: &str, outcome: &TaskOutcome) -> Option<Verdict> {
        if !outcome.is_success() {
            self.failed.fetch_add(1, Ordering::AcqRel);
            let _ = self
                .first_error
                .set(format!("{filename}: {}", outcome.describe()));
        }

        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => Some(self.verdict()),
            Ok(_) => None,
            Err(_) => {
                tracing::warn!("outcome for {filename} arrived after all tasks finished");
                None
            }
        }
    }

    /// Current verdict, computed from the counters.
    pub fn verdict(&self) -> Verdict {
        let failed = self.failed.load(Ordering::Acquire);
        if failed == 0 {
            Verdict::AllSucceeded {
                succeeded: self.planned,
            }
        } else {
            Verdict::AbortedOnError {
                failed,
                planned: self.planned,
                first_error: self
                    .first_error
                    .get()
                    .cloned()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }
        }
    }
}
