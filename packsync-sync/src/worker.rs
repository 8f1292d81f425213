//! Bounded pool of download workers.
//!
//! ## Per-task protocol
//!
//! 1. Announce the attempt (`on_start`).
//! 2. GET the file URL with the download timeouts.
//! 3. Stream the body into `<file>.<task id>.packsync.tmp`, reporting
//!    progress after every chunk.
//! 4. Verify the temp file against the expected digest; a mismatch deletes
//!    it and counts as a failed attempt.
//! 5. Rename the temp file over the destination.
//!
//! Failed attempts are retried with backoff until `max_attempts` is spent.
//! A temp file never outlives its attempt.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::Receiver;

use packsync_core::{FetchTask, RuntimeConfig, Timeouts};

use crate::cancel::CancelToken;
use crate::error::{transfer_io_err, TransferError};
use crate::hash::{HashVerifier, Verification};
use crate::progress::EventSender;
use crate::retry::Backoff;
use crate::transport::{body_read_error, Transport};

const CHUNK_SIZE: usize = 8 * 1024;

/// Result of one task (or, for [`TaskOutcome::TransientFailure`], of one
/// attempt that may still be retried).
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    TransientFailure(TransferError),
    PermanentFailure { attempts: u32, cause: TransferError },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }

    /// Human-readable failure description; empty for success.
    pub fn describe(&self) -> String {
        match self {
            TaskOutcome::Success => String::new(),
            TaskOutcome::TransientFailure(cause) => cause.to_string(),
            TaskOutcome::PermanentFailure {
                attempts: _,
                cause: TransferError::Cancelled,
            } => "download cancelled".to_string(),
            TaskOutcome::PermanentFailure { attempts, cause } => {
                format!("download failed after {attempts} attempt(s): {cause}")
            }
        }
    }
}

/// Knobs for a single transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub max_attempts: u32,
    pub timeouts: Timeouts,
    pub backoff: Backoff,
}

impl TransferSettings {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            timeouts: config.download_timeouts(),
            backoff: Backoff::from_config(config),
        }
    }
}

/// Fixed-size worker pool for one run. Workers are spawned by
/// [`DownloadWorkerPool::run`] and joined before it returns.
pub struct DownloadWorkerPool<T> {
    transport: T,
    target_dir: PathBuf,
    threads: usize,
    settings: TransferSettings,
    cancel: CancelToken,
    verifier: HashVerifier,
}

impl<T: Transport> DownloadWorkerPool<T> {
    pub fn new(
        transport: T,
        target_dir: impl Into<PathBuf>,
        threads: usize,
        settings: TransferSettings,
    ) -> Self {
        Self {
            transport,
            target_dir: target_dir.into(),
            threads: threads.max(1),
            settings,
            cancel: CancelToken::new(),
            verifier: HashVerifier,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every task to a terminal outcome and hand each outcome to
    /// `on_outcome` exactly once, from the worker that produced it.
    ///
    /// Tasks are dequeued in the given order; completion order is arbitrary.
    /// Blocks until all workers have exited.
    pub fn run<F>(&self, tasks: Vec<FetchTask>, events: &EventSender, on_outcome: F)
    where
        F: Fn(&FetchTask, TaskOutcome) + Sync,
    {
        if tasks.is_empty() {
            return;
        }
        let workers = self.threads.min(tasks.len());
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        for task in tasks {
            let _ = queue_tx.send(task);
        }
        drop(queue_tx);

        tracing::debug!("starting {workers} download worker(s)");
        thread::scope(|s| {
            let mut spawned = 0;
            for index in 0..workers {
                let queue = queue_rx.clone();
                let on_outcome = &on_outcome;
                let spawn = thread::Builder::new()
                    .name(format!("packsync-worker-{index}"))
                    .spawn_scoped(s, move || self.drain(&queue, events, on_outcome));
                match spawn {
                    Ok(_) => spawned += 1,
                    Err(err) => tracing::warn!("could not spawn worker {index}: {err}"),
                }
            }
            if spawned == 0 {
                tracing::warn!("no worker threads available; downloading on the caller thread");
                self.drain(&queue_rx, events, &on_outcome);
            }
        });
    }

    fn drain<F>(&self, queue: &Receiver<FetchTask>, events: &EventSender, on_outcome: &F)
    where
        F: Fn(&FetchTask, TaskOutcome),
    {
        while let Ok(task) = queue.recv() {
            let outcome = self.execute(&task, events);
            on_outcome(&task, outcome);
        }
    }

    /// The retry loop for one task. Never returns
    /// [`TaskOutcome::TransientFailure`].
    pub fn execute(&self, task: &FetchTask, events: &EventSender) -> TaskOutcome {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let cause = match self.attempt(task, events) {
                TaskOutcome::Success => {
                    tracing::info!("downloaded {}", task.filename);
                    events.complete(&task.filename);
                    return TaskOutcome::Success;
                }
                TaskOutcome::PermanentFailure { cause, .. } => cause,
                TaskOutcome::TransientFailure(cause) if attempt < max_attempts => {
                    tracing::warn!(
                        "attempt {attempt}/{max_attempts} for {} failed: {cause}",
                        task.filename
                    );
                    let delay = self.settings.backoff.jittered(attempt - 1);
                    if self.cancel.sleep(delay) {
                        continue;
                    }
                    TransferError::Cancelled
                }
                TaskOutcome::TransientFailure(cause) => cause,
            };

            let outcome = TaskOutcome::PermanentFailure {
                attempts: attempt,
                cause,
            };
            let message = outcome.describe();
            tracing::error!("{}: {message}", task.filename);
            events.error(Some(&task.filename), message);
            return outcome;
        }
    }

    /// A single attempt. Returns `Success`, `TransientFailure` for anything
    /// worth retrying, or `PermanentFailure` when cancelled.
    fn attempt(&self, task: &FetchTask, events: &EventSender) -> TaskOutcome {
        match self.transfer(task, events) {
            Ok(()) => TaskOutcome::Success,
            Err(cause) if cause.is_retryable() => TaskOutcome::TransientFailure(cause),
            Err(cause) => TaskOutcome::PermanentFailure { attempts: 1, cause },
        }
    }

    fn transfer(&self, task: &FetchTask, events: &EventSender) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        events.start(&task.filename);

        let response = self.transport.get(&task.remote_url, self.settings.timeouts)?;
        if !response.is_success() {
            return Err(TransferError::HttpStatus(response.status));
        }
        let total = response.content_length;

        let destination = self.target_dir.join(&task.filename);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| transfer_io_err(parent, e))?;
        }
        let (partial, mut file) = PartialFile::create(temp_path(&destination, task))?;

        let mut body = response.body;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut done: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(body_read_error(&e).into()),
            };
            file.write_all(&buf[..n])
                .map_err(|e| transfer_io_err(partial.path(), e))?;
            done += n as u64;
            events.progress(&task.filename, done, total);
        }
        file.sync_all()
            .map_err(|e| transfer_io_err(partial.path(), e))?;
        drop(file);

        if done != task.expected_size {
            tracing::debug!(
                "{}: received {done} bytes, manifest says {}",
                task.filename,
                task.expected_size
            );
        }

        let actual = match self.verifier.verify(partial.path(), &task.expected_digest) {
            Verification::Valid => return partial.persist(&destination),
            Verification::Mismatch(actual) => Some(actual.to_string()),
            Verification::Unreadable(err) => {
                tracing::debug!("{}: downloaded file unreadable: {err}", task.filename);
                None
            }
        };
        Err(TransferError::DigestMismatch {
            filename: task.filename.clone(),
            expected: task.expected_digest.to_string(),
            actual,
        })
    }
}

/// `<dir>/<name>.<task id>.packsync.tmp`, beside the destination so the
/// final rename stays on one filesystem.
fn temp_path(destination: &Path, task: &FetchTask) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    destination.with_file_name(format!("{name}.{}.packsync.tmp", task.id.0))
}

/// A temp file that is removed on drop unless persisted.
struct PartialFile {
    path: PathBuf,
    persisted: bool,
}

impl PartialFile {
    fn create(path: PathBuf) -> Result<(Self, File), TransferError> {
        let file = File::create(&path).map_err(|e| transfer_io_err(&path, e))?;
        let guard = Self {
            path,
            persisted: false,
        };
        Ok((guard, file))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self, destination: &Path) -> Result<(), TransferError> {
        fs::rename(&self.path, destination).map_err(|e| transfer_io_err(destination, e))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = fs::remove_file(&self.path);
        }
    }
}
