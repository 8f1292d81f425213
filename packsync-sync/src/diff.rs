//! Local/remote comparison producing the [`SyncPlan`] for a run.
//!
//! Policy for an existing file that cannot be hashed: it is left out of the
//! plan and reported in [`SyncPlan::skipped`]. Such a file is never fetched
//! in this run, so operators should look at the skipped list.

use std::io::ErrorKind;
use std::path::Path;

use packsync_core::{ManifestEntry, PlanEntry, PlanReason, SkippedEntry, SyncPlan};

use crate::hash::HashVerifier;

/// Compares manifest entries with the files under a local directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    verifier: HashVerifier,
}

impl DiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries that are missing locally or whose digest differs, in
    /// manifest order. Duplicate filenames stay duplicated. No network.
    pub fn plan(&self, local_dir: &Path, manifest: &[ManifestEntry]) -> SyncPlan {
        let mut plan = SyncPlan::default();

        for entry in manifest {
            let path = entry.local_path(local_dir);

            match std::fs::metadata(&path) {
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    tracing::debug!("new file: {}", entry.filename);
                    plan.entries.push(PlanEntry {
                        entry: entry.clone(),
                        reason: PlanReason::Missing,
                    });
                    continue;
                }
                Err(err) => {
                    skip(&mut plan, entry, err.to_string());
                    continue;
                }
                Ok(_) => {}
            }

            match self.verifier.matches(&path, &entry.digest) {
                Ok(true) => tracing::debug!("up to date: {}", entry.filename),
                Ok(false) => {
                    tracing::debug!("needs update: {}", entry.filename);
                    plan.entries.push(PlanEntry {
                        entry: entry.clone(),
                        reason: PlanReason::Stale,
                    });
                }
                Err(err) => skip(&mut plan, entry, err.to_string()),
            }
        }

        plan
    }
}

fn skip(plan: &mut SyncPlan, entry: &ManifestEntry, reason: String) {
    tracing::warn!(
        "cannot verify {}; leaving it out of this run: {reason}",
        entry.filename
    );
    plan.skipped.push(SkippedEntry {
        filename: entry.filename.clone(),
        reason,
    });
}
