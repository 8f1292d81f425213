//! # packsync-sync
//!
//! Keeps a local package set in step with a remote manifest.
//!
//! Call [`SyncOrchestrator::synchronize`] to run a full session: fetch the
//! manifest, diff it against the local directory by SHA-256, download what
//! is missing or stale on a bounded worker pool, and schedule a restart once
//! every download has been verified. [`DiffEngine::plan`] alone gives a
//! dry-run view of what a session would fetch.

pub mod cancel;
pub mod diff;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod state;
pub mod task;
pub mod transport;
pub mod worker;

pub use cancel::CancelToken;
pub use diff::DiffEngine;
pub use error::{FetchError, HashError, TransferError, TransportError};
pub use hash::{HashVerifier, Verification};
pub use manifest::ManifestClient;
pub use orchestrator::{
    Countdown, RuntimeControl, SyncAbort, SyncOrchestrator, SyncPhase, SyncReport, SyncResult,
};
pub use progress::{ProgressSink, SyncEvent};
pub use transport::{HttpResponse, Transport, UreqTransport};
pub use worker::{DownloadWorkerPool, TaskOutcome, TransferSettings};
