//! In-memory HTTP fake and recording collaborators shared by the
//! integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use packsync_core::{RuntimeConfig, Timeouts};
use packsync_sync::hash::digest_bytes;
use packsync_sync::{HttpResponse, RuntimeControl, Transport, TransportError};

pub const API: &str = "http://fake/api/";
pub const MODS: &str = "http://fake/mods";
pub const VERSION: &str = "1.20.1";

#[derive(Clone)]
pub enum Route {
    Ok(Vec<u8>),
    Status(u16),
    Timeout,
    Network,
}

/// Route table keyed by full URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeServer {
    routes: Mutex<HashMap<String, Route>>,
    hits: Mutex<HashMap<String, usize>>,
    timeouts: Mutex<HashMap<String, Timeouts>>,
    total: AtomicUsize,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: impl Into<String>, route: Route) -> &Self {
        self.routes.lock().unwrap().insert(url.into(), route);
        self
    }

    /// Serve `files` as the manifest and as downloadable files.
    pub fn publish(&self, files: &[(&str, &[u8])]) -> &Self {
        self.route(manifest_url(), Route::Ok(manifest_json(files).into_bytes()));
        for (name, content) in files {
            self.route(file_url(name), Route::Ok(content.to_vec()));
        }
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Timeouts passed with the most recent request for `url`.
    pub fn timeouts_for(&self, url: &str) -> Option<Timeouts> {
        self.timeouts.lock().unwrap().get(url).copied()
    }

    pub fn total_hits(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl Transport for FakeServer {
    fn get(&self, url: &str, timeouts: Timeouts) -> Result<HttpResponse, TransportError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.timeouts
            .lock()
            .unwrap()
            .insert(url.to_string(), timeouts);
        let route = self.routes.lock().unwrap().get(url).cloned();
        match route {
            Some(Route::Ok(bytes)) => Ok(HttpResponse {
                status: 200,
                content_length: Some(bytes.len() as u64),
                body: Box::new(Cursor::new(bytes)),
            }),
            Some(Route::Status(status)) => Ok(HttpResponse {
                status,
                content_length: None,
                body: Box::new(Cursor::new(Vec::new())),
            }),
            Some(Route::Timeout) => Err(TransportError::Timeout("read timed out".to_string())),
            Some(Route::Network) => Err(TransportError::Network("connection refused".to_string())),
            None => Ok(HttpResponse {
                status: 404,
                content_length: None,
                body: Box::new(Cursor::new(Vec::new())),
            }),
        }
    }
}

pub fn manifest_url() -> String {
    format!("{API}{VERSION}")
}

pub fn file_url(name: &str) -> String {
    packsync_sync::task::file_url(MODS, VERSION, name)
}

pub fn manifest_json(files: &[(&str, &[u8])]) -> String {
    let entries: Vec<_> = files
        .iter()
        .map(|(name, content)| {
            serde_json::json!({
                "filename": name,
                "hash": digest_bytes(content).to_string(),
                "size": content.len(),
            })
        })
        .collect();
    serde_json::json!({ "files": entries }).to_string()
}

/// Defaults pointed at the fake endpoints, with no backoff delay.
pub fn config(retries: u32, threads: usize) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.providers.api.base_url = API.to_string();
    config.providers.api.current_version = VERSION.to_string();
    config.providers.mods.base_url = MODS.to_string();
    config.download.retries = retries;
    config.download.threads = threads;
    config.download.backoff_base_ms = 0;
    config.download.backoff_max_ms = 0;
    config
}

/// Counts restart requests.
#[derive(Default)]
pub struct RecordingControl {
    restarts: AtomicUsize,
}

impl RecordingControl {
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl RuntimeControl for RecordingControl {
    fn schedule_restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn instant_countdown() -> packsync_sync::Countdown {
    packsync_sync::Countdown {
        ticks: 3,
        interval: Duration::ZERO,
    }
}
