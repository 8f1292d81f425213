//! Remote manifest retrieval and parsing.
//!
//! Accepted body shapes:
//!
//! ```text
//! {"files": [{"filename": "a.jar", "hash": "<hex>", "size": 10}, ...]}
//! [{"filename": "a.jar", "digest": "<hex>", "size": 10}, ...]
//! ```
//!
//! Any missing or mistyped field fails the whole fetch; there is no partial
//! manifest.

use std::path::{Component, Path};

use serde_json::Value;

use packsync_core::{ManifestEntry, Timeouts};

use crate::error::FetchError;
use crate::transport::{body_read_error, Transport};

/// Fetches the manifest for one version from the API endpoint.
pub struct ManifestClient<T> {
    transport: T,
    timeouts: Timeouts,
}

impl<T: Transport> ManifestClient<T> {
    pub fn new(transport: T, timeouts: Timeouts) -> Self {
        Self {
            transport,
            timeouts,
        }
    }

    /// `GET {base_url%/}{version}` and parse the body.
    pub fn fetch_manifest(
        &self,
        base_url: &str,
        version: &str,
    ) -> Result<Vec<ManifestEntry>, FetchError> {
        let url = manifest_url(base_url, version);
        tracing::debug!("fetching manifest from {url}");

        let response = self.transport.get(&url, self.timeouts)?;
        if !response.is_success() {
            return Err(FetchError::HttpStatus(response.status));
        }

        let value: Value = serde_json::from_reader(response.body).map_err(|e| {
            if e.is_io() {
                let io = std::io::Error::from(e);
                FetchError::from(body_read_error(&io))
            } else {
                FetchError::Format(format!("body is not valid JSON: {e}"))
            }
        })?;
        let entries = parse_manifest(value)?;
        tracing::info!("manifest lists {} file(s)", entries.len());
        Ok(entries)
    }
}

/// `base_url` with exactly one trailing slash, followed by `version`.
pub fn manifest_url(base_url: &str, version: &str) -> String {
    format!("{}{}", with_trailing_slash(base_url), version)
}

pub(crate) fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// Interpret an already-decoded JSON document as a manifest.
pub fn parse_manifest(value: Value) -> Result<Vec<ManifestEntry>, FetchError> {
    let items = match value {
        Value::Object(mut obj) => match obj.remove("files") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(FetchError::Format("'files' is not an array".to_string())),
            None => return Err(FetchError::Format("missing 'files' field".to_string())),
        },
        Value::Array(items) => items,
        _ => {
            return Err(FetchError::Format(
                "expected an object with 'files' or a bare array".to_string(),
            ))
        }
    };

    let mut entries = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            return Err(FetchError::Format(format!("entry {index} is not an object")));
        }
        let entry: ManifestEntry = serde_json::from_value(item)
            .map_err(|e| FetchError::Format(format!("entry {index}: {e}")))?;
        check_filename(&entry.filename)
            .map_err(|reason| FetchError::Format(format!("entry {index}: {reason}")))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Filenames must stay inside the target directory.
fn check_filename(filename: &str) -> Result<(), String> {
    if filename.trim().is_empty() {
        return Err("empty filename".to_string());
    }
    let path = Path::new(filename);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("filename '{filename}' escapes the target directory"));
            }
        }
    }
    Ok(())
}
