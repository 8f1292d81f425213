//! Turning a [`SyncPlan`] into [`FetchTask`]s.

use url::form_urlencoded;

use packsync_core::{FetchTask, RuntimeConfig, SyncPlan, TaskId};

use crate::manifest::with_trailing_slash;

/// One task per plan entry, in plan order.
pub fn build_tasks(plan: &SyncPlan, config: &RuntimeConfig) -> Vec<FetchTask> {
    let base = &config.providers.mods.base_url;
    let version = &config.providers.api.current_version;
    plan.entries
        .iter()
        .enumerate()
        .map(|(index, planned)| FetchTask {
            id: TaskId(index),
            remote_url: file_url(base, version, &planned.entry.filename),
            filename: planned.entry.filename.clone(),
            expected_digest: planned.entry.digest.clone(),
            expected_size: planned.entry.size,
        })
        .collect()
}

/// `{base%/}{version}/{url-encoded filename}`
///
/// The filename is form-encoded as a single segment with spaces as `%20`.
pub fn file_url(base_url: &str, version: &str, filename: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(filename.as_bytes()).collect();
    format!(
        "{}{}/{}",
        with_trailing_slash(base_url),
        version,
        encoded.replace('+', "%20")
    )
}
