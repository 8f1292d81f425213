//! Session sequencing: manifest, diff, downloads, then the lifecycle action.
//!
//! ## Phases
//!
//! ```text
//! FetchingManifest -> Diffing -> NoOpDone
//!                             -> Downloading -> AllSucceeded
//!                                            -> AbortedOnError
//! FetchingManifest --(error)--> AbortedOnError
//! ```
//!
//! All sink notifications go through one dispatcher thread that lives for
//! the duration of [`SyncOrchestrator::synchronize`].

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use packsync_core::{RuntimeConfig, SkippedEntry};

use crate::cancel::CancelToken;
use crate::diff::DiffEngine;
use crate::error::FetchError;
use crate::manifest::ManifestClient;
use crate::progress::{self, EventSender, ProgressSink, SyncEvent};
use crate::state::{SyncState, Verdict};
use crate::task::build_tasks;
use crate::transport::Transport;
use crate::worker::{DownloadWorkerPool, TransferSettings};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Process lifecycle capability supplied by the host.
pub trait RuntimeControl {
    /// Called at most once per session, after every download succeeded and
    /// the countdown finished.
    fn schedule_restart(&self);
}

/// Ticks announced before the restart, one per `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub ticks: u32,
    pub interval: Duration,
}

impl Countdown {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            ticks: config.lifecycle.countdown_secs,
            interval: Duration::from_secs(1),
        }
    }

    pub fn none() -> Self {
        Self {
            ticks: 0,
            interval: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    FetchingManifest,
    Diffing,
    NoOpDone,
    Downloading,
    AllSucceeded,
    AbortedOnError,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncPhase::FetchingManifest => "fetching manifest",
            SyncPhase::Diffing => "diffing",
            SyncPhase::NoOpDone => "up to date",
            SyncPhase::Downloading => "downloading",
            SyncPhase::AllSucceeded => "all succeeded",
            SyncPhase::AbortedOnError => "aborted on error",
        };
        f.write_str(s)
    }
}

/// Why a session ended in [`SyncPhase::AbortedOnError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAbort {
    /// The manifest stage failed; nothing was downloaded.
    Manifest(FetchError),
    /// At least one task ended in a permanent failure.
    Tasks {
        failed: usize,
        planned: usize,
        first_error: String,
    },
}

impl fmt::Display for SyncAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAbort::Manifest(err) => write!(f, "{err}"),
            SyncAbort::Tasks {
                failed,
                planned,
                first_error,
            } => write!(
                f,
                "{failed} of {planned} download(s) failed; first error: {first_error}"
            ),
        }
    }
}

/// Terminal state of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    /// The plan was empty. No restart.
    UpToDate,
    AllSucceeded {
        downloaded: usize,
        restart_scheduled: bool,
    },
    AbortedOnError(SyncAbort),
}

impl SyncResult {
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncResult::UpToDate => SyncPhase::NoOpDone,
            SyncResult::AllSucceeded { .. } => SyncPhase::AllSucceeded,
            SyncResult::AbortedOnError(_) => SyncPhase::AbortedOnError,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, SyncResult::AbortedOnError(_))
    }
}

/// Serializable summary of a session, for `--json` output and logs.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    #[serde(skip)]
    pub result: SyncResult,
    pub phase: SyncPhase,
    pub planned: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub skipped: Vec<SkippedEntry>,
    pub restart_scheduled: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// What the coordinator learned before the dispatcher shut down.
struct Session {
    result: SyncResult,
    planned: usize,
    skipped: Vec<SkippedEntry>,
}

impl Session {
    fn ended(result: SyncResult) -> Self {
        Self {
            result,
            planned: 0,
            skipped: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator<T> {
    config: RuntimeConfig,
    transport: T,
    target_dir: PathBuf,
    countdown: Countdown,
    cancel: CancelToken,
}

impl<T: Transport> SyncOrchestrator<T> {
    /// The configuration is taken by value and not reloaded during the run.
    pub fn new(config: RuntimeConfig, transport: T) -> Self {
        Self {
            target_dir: config.target_dir.clone(),
            countdown: Countdown::from_config(&config),
            config,
            transport,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = dir.into();
        self
    }

    pub fn with_countdown(mut self, countdown: Countdown) -> Self {
        self.countdown = countdown;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one session to its terminal state. Blocks until every task has
    /// finished and every notification has reached `sink`.
    pub fn synchronize(
        &self,
        sink: &mut (dyn ProgressSink + Send),
        control: &dyn RuntimeControl,
    ) -> SyncResult {
        self.synchronize_with_report(sink, control).result
    }

    /// [`SyncOrchestrator::synchronize`] plus timing and plan details.
    pub fn synchronize_with_report(
        &self,
        sink: &mut (dyn ProgressSink + Send),
        control: &dyn RuntimeControl,
    ) -> SyncReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let (events, receiver) = progress::channel();

        let session = thread::scope(|s| {
            let dispatcher = thread::Builder::new()
                .name("packsync-dispatch".to_string())
                .spawn_scoped(s, move || receiver.dispatch(sink));
            let dispatcher = match dispatcher {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::error!("could not start progress dispatcher: {err}");
                    let abort = SyncAbort::Tasks {
                        failed: 0,
                        planned: 0,
                        first_error: format!("could not start progress dispatcher: {err}"),
                    };
                    return Session::ended(SyncResult::AbortedOnError(abort));
                }
            };

            let session = self.drive(&events, control);
            drop(events);
            match dispatcher.join() {
                Ok(delivered) => tracing::debug!("delivered {delivered} progress event(s)"),
                Err(_) => tracing::error!("progress sink panicked; later events were dropped"),
            }
            session
        });

        let (downloaded, failed, restart_scheduled, error) = match &session.result {
            SyncResult::UpToDate => (0, 0, false, None),
            SyncResult::AllSucceeded {
                downloaded,
                restart_scheduled,
            } => (*downloaded, 0, *restart_scheduled, None),
            SyncResult::AbortedOnError(abort @ SyncAbort::Tasks { failed, planned, .. }) => {
                (planned - failed, *failed, false, Some(abort.to_string()))
            }
            SyncResult::AbortedOnError(abort) => (0, 0, false, Some(abort.to_string())),
        };

        SyncReport {
            phase: session.result.phase(),
            result: session.result,
            planned: session.planned,
            downloaded,
            failed,
            skipped: session.skipped,
            restart_scheduled,
            error,
            started_at,
            finished_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
        }
    }

    fn drive(&self, events: &EventSender, control: &dyn RuntimeControl) -> Session {
        // FetchingManifest
        enter(SyncPhase::FetchingManifest);
        let api = &self.config.providers.api;
        let client = ManifestClient::new(&self.transport, self.config.manifest_timeouts());
        let manifest = match client.fetch_manifest(&api.base_url, &api.current_version) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::error!("sync aborted: {err}");
                events.error(None, err.to_string());
                return Session::ended(SyncResult::AbortedOnError(SyncAbort::Manifest(err)));
            }
        };

        // Diffing
        enter(SyncPhase::Diffing);
        let plan = DiffEngine::new().plan(&self.target_dir, &manifest);
        if !plan.skipped.is_empty() {
            tracing::warn!(
                "{} file(s) could not be hashed and will not be updated this run",
                plan.skipped.len()
            );
        }
        if plan.is_empty() {
            enter(SyncPhase::NoOpDone);
            events.send(SyncEvent::UpToDate);
            return Session {
                result: SyncResult::UpToDate,
                planned: 0,
                skipped: plan.skipped,
            };
        }

        // Downloading
        enter(SyncPhase::Downloading);
        let tasks = build_tasks(&plan, &self.config);
        let state = SyncState::new(tasks.len());
        events.send(SyncEvent::Total {
            count: state.planned(),
        });

        let pool = DownloadWorkerPool::new(
            &self.transport,
            self.target_dir.clone(),
            self.config.download.threads,
            TransferSettings::from_config(&self.config),
        )
        .with_cancel(self.cancel.clone());

        let (verdict_tx, verdict_rx) = crossbeam_channel::bounded(1);
        pool.run(tasks, events, |task, outcome| {
            if let Some(verdict) = state.record(&task.filename, &outcome) {
                let _ = verdict_tx.try_send(verdict);
            }
        });
        let verdict = verdict_rx.try_recv().unwrap_or_else(|_| state.verdict());

        let result = match verdict {
            Verdict::AllSucceeded { succeeded } => {
                enter(SyncPhase::AllSucceeded);
                events.send(SyncEvent::AllDone);
                let restart_scheduled = self.countdown_and_restart(events, control);
                SyncResult::AllSucceeded {
                    downloaded: succeeded,
                    restart_scheduled,
                }
            }
            Verdict::AbortedOnError {
                failed,
                planned,
                first_error,
            } => {
                enter(SyncPhase::AbortedOnError);
                let abort = SyncAbort::Tasks {
                    failed,
                    planned,
                    first_error,
                };
                tracing::error!("sync aborted: {abort}");
                events.error(None, abort.to_string());
                SyncResult::AbortedOnError(abort)
            }
        };

        Session {
            result,
            planned: plan.len(),
            skipped: plan.skipped,
        }
    }

    /// Returns whether the restart was scheduled. Cancellation during the
    /// countdown suppresses it.
    fn countdown_and_restart(&self, events: &EventSender, control: &dyn RuntimeControl) -> bool {
        for seconds_left in (1..=self.countdown.ticks).rev() {
            events.send(SyncEvent::CountdownTick { seconds_left });
            if !self.cancel.sleep(self.countdown.interval) {
                break;
            }
        }
        // The sink must have seen every tick before the host restarts.
        events.flush();

        if self.cancel.is_cancelled() {
            tracing::warn!("restart skipped: sync was cancelled");
            return false;
        }
        tracing::info!("scheduling restart");
        control.schedule_restart();
        true
    }
}

fn enter(phase: SyncPhase) {
    tracing::info!("sync: {phase}");
}
