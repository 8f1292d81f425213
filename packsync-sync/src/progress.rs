//! Progress reporting: the [`ProgressSink`] collaborator and the single
//! dispatch point all notifications go through.
//!
//! Workers never call the sink directly. They push [`SyncEvent`]s into a
//! channel and one dispatcher thread, which owns the sink, delivers them in
//! order. The sink therefore only has to be `Send`, never `Sync`.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

/// Receiver of progress notifications. Calls arrive from one thread, in the
/// order they were emitted, and should return quickly.
pub trait ProgressSink {
    fn on_start(&mut self, filename: &str);
    fn on_progress(&mut self, filename: &str, bytes_done: u64, bytes_total: Option<u64>);
    fn on_total(&mut self, count: usize);
    fn on_complete(&mut self, filename: &str);
    fn on_error(&mut self, filename: Option<&str>, message: &str);
    fn on_all_done(&mut self);
    fn on_countdown_tick(&mut self, seconds_left: u32);

    /// The plan was empty; nothing will be downloaded.
    fn on_up_to_date(&mut self) {}
}

/// One notification, as carried through the dispatch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Start {
        filename: String,
    },
    Progress {
        filename: String,
        bytes_done: u64,
        bytes_total: Option<u64>,
    },
    Total {
        count: usize,
    },
    Complete {
        filename: String,
    },
    Error {
        filename: Option<String>,
        message: String,
    },
    UpToDate,
    AllDone,
    CountdownTick {
        seconds_left: u32,
    },
}

impl SyncEvent {
    pub fn deliver(&self, sink: &mut (dyn ProgressSink + Send + '_)) {
        match self {
            SyncEvent::Start { filename } => sink.on_start(filename),
            SyncEvent::Progress {
                filename,
                bytes_done,
                bytes_total,
            } => sink.on_progress(filename, *bytes_done, *bytes_total),
            SyncEvent::Total { count } => sink.on_total(*count),
            SyncEvent::Complete { filename } => sink.on_complete(filename),
            SyncEvent::Error { filename, message } => sink.on_error(filename.as_deref(), message),
            SyncEvent::UpToDate => sink.on_up_to_date(),
            SyncEvent::AllDone => sink.on_all_done(),
            SyncEvent::CountdownTick { seconds_left } => sink.on_countdown_tick(*seconds_left),
        }
    }
}

/// Records every notification; handy for tests and `--json` output.
impl ProgressSink for Vec<SyncEvent> {
    fn on_start(&mut self, filename: &str) {
        self.push(SyncEvent::Start {
            filename: filename.to_string(),
        });
    }

    fn on_progress(&mut self, filename: &str, bytes_done: u64, bytes_total: Option<u64>) {
        self.push(SyncEvent::Progress {
            filename: filename.to_string(),
            bytes_done,
            bytes_total,
        });
    }

    fn on_total(&mut self, count: usize) {
        self.push(SyncEvent::Total { count });
    }

    fn on_complete(&mut self, filename: &str) {
        self.push(SyncEvent::Complete {
            filename: filename.to_string(),
        });
    }

    fn on_error(&mut self, filename: Option<&str>, message: &str) {
        self.push(SyncEvent::Error {
            filename: filename.map(str::to_string),
            message: message.to_string(),
        });
    }

    fn on_all_done(&mut self) {
        self.push(SyncEvent::AllDone);
    }

    fn on_countdown_tick(&mut self, seconds_left: u32) {
        self.push(SyncEvent::CountdownTick { seconds_left });
    }

    fn on_up_to_date(&mut self) {
        self.push(SyncEvent::UpToDate);
    }
}

enum Command {
    Event(SyncEvent),
    Flush(Sender<()>),
}

/// Cloneable, non-blocking handle used by the coordinator and workers.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<Command>,
}

/// The dispatcher end. Consumed by [`EventReceiver::dispatch`].
pub struct EventReceiver {
    rx: Receiver<Command>,
}

/// Unbounded so that emitting never blocks a worker.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    pub fn send(&self, event: SyncEvent) {
        // A gone dispatcher only means nobody is listening any more.
        let _ = self.tx.send(Command::Event(event));
    }

    pub fn start(&self, filename: &str) {
        self.send(SyncEvent::Start {
            filename: filename.to_string(),
        });
    }

    pub fn progress(&self, filename: &str, bytes_done: u64, bytes_total: Option<u64>) {
        self.send(SyncEvent::Progress {
            filename: filename.to_string(),
            bytes_done,
            bytes_total,
        });
    }

    pub fn complete(&self, filename: &str) {
        self.send(SyncEvent::Complete {
            filename: filename.to_string(),
        });
    }

    pub fn error(&self, filename: Option<&str>, message: impl Into<String>) {
        self.send(SyncEvent::Error {
            filename: filename.map(str::to_string),
            message: message.into(),
        });
    }

    /// Block until every event queued before this call has been delivered.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl EventReceiver {
    /// Deliver events to `sink` until every [`EventSender`] is dropped.
    /// Returns the number of events delivered.
    pub fn dispatch(self, sink: &mut (dyn ProgressSink + Send + '_)) -> usize {
        let mut delivered = 0;
        for command in self.rx.iter() {
            match command {
                Command::Event(event) => {
                    event.deliver(sink);
                    delivered += 1;
                }
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        delivered
    }
}
