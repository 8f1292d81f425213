//! HTTP GET seam used by the manifest client and the download workers.
//!
//! [`UreqTransport`] is the production implementation. Tests substitute an
//! in-memory [`Transport`].

use std::error::Error as StdError;
use std::io::{self, Read};

use packsync_core::Timeouts;

use crate::error::TransportError;

/// A response whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    /// Server-declared `Content-Length`, if any.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Blocking HTTP GET with per-request connect/read timeouts.
///
/// Non-2xx answers are returned as responses, not errors; callers decide
/// what a status means.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, timeouts: Timeouts) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str, timeouts: Timeouts) -> Result<HttpResponse, TransportError> {
        (**self).get(url, timeouts)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn get(&self, url: &str, timeouts: Timeouts) -> Result<HttpResponse, TransportError> {
        (**self).get(url, timeouts)
    }
}

/// `ureq`-backed transport. A fresh agent is built per request so each call
/// gets exactly the timeouts it asked for.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    user_agent: String,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self {
            user_agent: concat!("packsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, timeouts: Timeouts) -> Result<HttpResponse, TransportError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeouts.connect)
            .timeout_read(timeouts.read)
            .user_agent(&self.user_agent)
            .build();

        let response = match agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => return Err(classify_transport(&transport)),
        };

        let status = response.status();
        let content_length = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        Ok(HttpResponse {
            status,
            content_length,
            body: Box::new(TimeoutAwareReader(response.into_reader())),
        })
    }
}

fn classify_transport(err: &ureq::Transport) -> TransportError {
    let message = err.to_string();
    if source_chain_timed_out(err) {
        TransportError::Timeout(message)
    } else {
        TransportError::Network(message)
    }
}

fn source_chain_timed_out(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if is_timeout_kind(io_err.kind()) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

pub(crate) fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Normalises read-timeout errors surfaced mid-body to `TimedOut`.
struct TimeoutAwareReader<R>(R);

impl<R: Read> Read for TimeoutAwareReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| {
            if is_timeout_kind(e.kind()) {
                io::Error::new(io::ErrorKind::TimedOut, e)
            } else {
                e
            }
        })
    }
}

/// Map an I/O error raised while reading a response body.
pub(crate) fn body_read_error(err: &io::Error) -> TransportError {
    if is_timeout_kind(err.kind()) {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
