//! Domain types for a package-set sync run.
//!
//! Every type here is immutable once produced: the manifest is parsed once,
//! the plan is computed once, and each task is handed to exactly one worker.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A hex-encoded SHA-256 digest, normalised to trimmed lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Digest {
    fn from(s: String) -> Self {
        Self(s.trim().to_ascii_lowercase())
    }
}

impl From<&str> for Digest {
    fn from(s: &str) -> Self {
        Self(s.trim().to_ascii_lowercase())
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.0
    }
}

/// Identifier of a fetch task within one run (its position in the plan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One desired file as described by the remote manifest.
///
/// The digest may arrive as `digest`, `hash`, or both; when both are present
/// they must agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawManifestEntry")]
pub struct ManifestEntry {
    /// Path relative to the target directory.
    pub filename: String,
    pub digest: Digest,
    pub size: u64,
}

/// Wire shape of a [`ManifestEntry`] before the digest keys are reconciled.
#[derive(Deserialize)]
struct RawManifestEntry {
    filename: String,
    #[serde(default)]
    digest: Option<Digest>,
    #[serde(default)]
    hash: Option<Digest>,
    size: u64,
}

impl TryFrom<RawManifestEntry> for ManifestEntry {
    type Error = String;

    fn try_from(raw: RawManifestEntry) -> Result<Self, Self::Error> {
        let digest = match (raw.digest, raw.hash) {
            (Some(digest), Some(hash)) if digest != hash => {
                return Err(format!(
                    "`digest` ({digest}) and `hash` ({hash}) disagree for {}",
                    raw.filename
                ));
            }
            (Some(digest), _) => digest,
            (None, Some(hash)) => hash,
            (None, None) => return Err("missing field `digest` (or `hash`)".to_string()),
        };
        Ok(Self {
            filename: raw.filename,
            digest,
            size: raw.size,
        })
    }
}

impl ManifestEntry {
    /// `<local_dir>/<filename>`
    pub fn local_path(&self, local_dir: &Path) -> PathBuf {
        local_dir.join(&self.filename)
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Why an entry ended up in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanReason {
    /// No local file exists.
    Missing,
    /// A local file exists but its digest differs from the manifest.
    Stale,
}

impl fmt::Display for PlanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanReason::Missing => write!(f, "missing"),
            PlanReason::Stale => write!(f, "stale"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub entry: ManifestEntry,
    pub reason: PlanReason,
}

/// A manifest entry left out of the plan because its local file exists but
/// could not be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub filename: String,
    pub reason: String,
}

/// Files that need fetching in this run, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub entries: Vec<PlanEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedEntry>,
}

impl SyncPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.entry.filename.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Unit of work: fetch one file and verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub id: TaskId,
    pub remote_url: String,
    pub filename: String,
    pub expected_digest: Digest,
    pub expected_size: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
