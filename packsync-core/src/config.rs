//! Runtime configuration and its YAML loader.
//!
//! # Storage layout
//!
//! ```text
//! ~/.packsync/
//!   config.yaml   (mode 0600, written with defaults on first load)
//! ```
//!
//! # API pattern
//!
//! Every function touching disk has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! The configuration is read once before a sync run and handed to the
//! engine by value; nothing reloads it mid-run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

// ---------------------------------------------------------------------------
// 1. Shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub providers: ProvidersConfig,
    pub download: DownloadConfig,
    pub lifecycle: LifecycleConfig,
    /// Directory the package set lives in. Relative paths resolve against
    /// the working directory of the caller.
    pub target_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            download: DownloadConfig::default(),
            lifecycle: LifecycleConfig::default(),
            target_dir: PathBuf::from("mods"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub api: ApiConfig,
    pub mods: ModsConfig,
}

/// Manifest endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub current_version: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9009/api/".to_string(),
            current_version: "1.20.1".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 15,
        }
    }
}

/// File endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModsConfig {
    pub base_url: String,
}

impl Default for ModsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9009/mods".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub threads: usize,
    /// Extra attempts after the first one.
    pub retries: u32,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Base delay for exponential backoff between attempts; `0` disables it.
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            retries: 3,
            connect_timeout_secs: 15,
            read_timeout_secs: 30,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds counted down before the restart is scheduled.
    pub countdown_secs: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { countdown_secs: 3 }
    }
}

/// Connect/read timeout pair applied to a single HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl RuntimeConfig {
    pub fn manifest_timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.providers.api.connect_timeout_secs),
            read: Duration::from_secs(self.providers.api.read_timeout_secs),
        }
    }

    pub fn download_timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.download.connect_timeout_secs),
            read: Duration::from_secs(self.download.read_timeout_secs),
        }
    }

    /// Total attempts per task: the first try plus `retries`.
    pub fn max_attempts(&self) -> u32 {
        self.download.retries.saturating_add(1)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download.threads == 0 {
            return Err(ConfigError::Invalid(
                "download.threads must be at least 1".to_string(),
            ));
        }
        check_http_url("providers.api.base_url", &self.providers.api.base_url)?;
        check_http_url("providers.mods.base_url", &self.providers.mods.base_url)?;
        if self.providers.api.current_version.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "providers.api.current_version must not be empty".to_string(),
            ));
        }
        if self.download.backoff_max_ms < self.download.backoff_base_ms {
            return Err(ConfigError::Invalid(
                "download.backoff_max_ms must be >= download.backoff_base_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be an http(s) URL, got '{url}'"
        )))
    }
}

// ---------------------------------------------------------------------------
// 2. Paths
// ---------------------------------------------------------------------------

/// `<home>/.packsync/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".packsync").join("config.yaml")
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load and validate a config file at an explicit path.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
/// path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: RuntimeConfig = if contents.trim().is_empty() {
        RuntimeConfig::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?
    };
    config.validate()?;
    Ok(config)
}

/// Load `<home>/.packsync/config.yaml`.
pub fn load_at(home: &Path) -> Result<RuntimeConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<RuntimeConfig, ConfigError> {
    load_at(&home()?)
}

/// Load the config, writing the defaults first if no file exists yet.
pub fn load_or_init_at(home: &Path) -> Result<RuntimeConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        let config = RuntimeConfig::default();
        save_at(home, &config)?;
        return Ok(config);
    }
    load_from(&path)
}

/// `load_or_init_at` convenience wrapper.
pub fn load_or_init() -> Result<RuntimeConfig, ConfigError> {
    load_or_init_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save
// ---------------------------------------------------------------------------

/// Atomically save the config to `<home>/.packsync/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &RuntimeConfig) -> Result<(), ConfigError> {
    let path = config_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid config path")));
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }

    let yaml = serde_yaml::to_string(config)?;
    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &RuntimeConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
