//! Terminal renderings of sync progress.

use std::collections::HashMap;
use std::io::Write;

use colored::Colorize;

use packsync_sync::{ProgressSink, SyncEvent};

/// Human-readable progress on stdout, one line per file.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    total: usize,
    completed: usize,
    bytes: HashMap<String, u64>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for ConsoleSink {
    fn on_start(&mut self, filename: &str) {
        self.bytes.insert(filename.to_string(), 0);
        println!("  {} {filename}", "↓".bright_black());
    }

    fn on_progress(&mut self, filename: &str, bytes_done: u64, _bytes_total: Option<u64>) {
        self.bytes.insert(filename.to_string(), bytes_done);
    }

    fn on_total(&mut self, count: usize) {
        self.total = count;
        println!("Downloading {count} file(s)");
    }

    fn on_complete(&mut self, filename: &str) {
        self.completed += 1;
        let size = self.bytes.remove(filename).unwrap_or(0);
        println!(
            "  {} {filename} ({}) [{}/{}]",
            "✓".green(),
            human_size(size),
            self.completed,
            self.total
        );
    }

    fn on_error(&mut self, filename: Option<&str>, message: &str) {
        match filename {
            Some(name) => println!("  {} {name}: {message}", "✗".red()),
            None => println!("{} {message}", "error:".red().bold()),
        }
    }

    fn on_all_done(&mut self) {
        println!("{}", "✓ All files downloaded and verified".green().bold());
    }

    fn on_countdown_tick(&mut self, seconds_left: u32) {
        println!("Restarting in {seconds_left}...");
    }

    fn on_up_to_date(&mut self) {
        println!("{}", "✓ Everything is up to date".green());
    }
}

/// One JSON object per line on stdout. Per-chunk progress is omitted.
#[derive(Debug, Default)]
pub struct JsonLinesSink;

impl JsonLinesSink {
    fn emit(&self, event: SyncEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{line}");
        }
    }
}

impl ProgressSink for JsonLinesSink {
    fn on_start(&mut self, filename: &str) {
        self.emit(SyncEvent::Start {
            filename: filename.to_string(),
        });
    }

    fn on_progress(&mut self, _filename: &str, _bytes_done: u64, _bytes_total: Option<u64>) {}

    fn on_total(&mut self, count: usize) {
        self.emit(SyncEvent::Total { count });
    }

    fn on_complete(&mut self, filename: &str) {
        self.emit(SyncEvent::Complete {
            filename: filename.to_string(),
        });
    }

    fn on_error(&mut self, filename: Option<&str>, message: &str) {
        self.emit(SyncEvent::Error {
            filename: filename.map(str::to_string),
            message: message.to_string(),
        });
    }

    fn on_all_done(&mut self) {
        self.emit(SyncEvent::AllDone);
    }

    fn on_countdown_tick(&mut self, seconds_left: u32) {
        self.emit(SyncEvent::CountdownTick { seconds_left });
    }

    fn on_up_to_date(&mut self) {
        self.emit(SyncEvent::UpToDate);
    }
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
