//! packsync core library — domain types, runtime configuration, errors.
//!
//! - [`types`] — manifest entries, plans and fetch tasks
//! - [`config`] — [`RuntimeConfig`] and its YAML loader
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{RuntimeConfig, Timeouts};
pub use error::ConfigError;
pub use types::{
    Digest, FetchTask, ManifestEntry, PlanEntry, PlanReason, SkippedEntry, SyncPlan, TaskId,
};
