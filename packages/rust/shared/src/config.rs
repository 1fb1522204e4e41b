//! Application configuration for FightSync.
//!
//! User config lives at `~/.fightsync/fightsync.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! The similarity threshold and request-rate limits were hand-tuned
//! against the live sources; they are carried here as named, overridable
//! settings rather than re-derived.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FightSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "fightsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".fightsync";

/// Fuzzy-match acceptance threshold. Too low merges distinct fighters;
/// too high fragments one fighter into duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.70;

// ---------------------------------------------------------------------------
// Config structs (matching fightsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Identity matching settings.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Shared request-rate gate settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Persistent store settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Source feed locations, keyed by source name (roster, details,
    /// sherdog, rankings, bouts). Values are URLs or file paths.
    #[serde(default)]
    pub sources: std::collections::BTreeMap<String, String>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for snapshots, ledgers, and the database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Concurrent fetch workers for a first pass.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Concurrent fetch workers for retry passes (kept smaller to shed
    /// load on a likely-degraded upstream).
    #[serde(default = "default_retry_workers")]
    pub retry_workers: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workers: default_workers(),
            retry_workers: default_retry_workers(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.fightsync/data".into()
}
fn default_workers() -> usize {
    4
}
fn default_retry_workers() -> usize {
    2
}

/// `[matching]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum containment similarity accepted as a fuzzy match.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Extra override entries merged on top of the built-in table.
    #[serde(default)]
    pub overrides: Vec<OverrideEntryConfig>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            overrides: Vec::new(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

/// `[[matching.overrides]]` entry — a known aliasing/transliteration
/// correction that normalization cannot repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideEntryConfig {
    /// Name as the mismatching source renders it.
    pub name: String,
    /// Corrected name, if the fix is an alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Direct source locator, if the fix bypasses search entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum delay between any two requests, in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Maximum requests per rolling window.
    #[serde(default = "default_window_max_requests")]
    pub window_max_requests: u32,

    /// Rolling window length, in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay_ms(),
            window_max_requests: default_window_max_requests(),
            window_secs: default_window_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_request_delay_ms() -> u64 {
    1000
}
fn default_window_max_requests() -> u32 {
    40
}
fn default_window_secs() -> u64 {
    60
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Rows per insert transaction during loads.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    500
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Concurrent fetch workers for a first pass.
    pub workers: usize,
    /// Concurrent fetch workers for retry passes.
    pub retry_workers: usize,
    /// Minimum delay between any two requests.
    pub min_delay: Duration,
    /// Maximum requests per rolling window.
    pub window_max_requests: u32,
    /// Rolling window length.
    pub window: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.defaults.workers,
            retry_workers: config.defaults.retry_workers,
            min_delay: Duration::from_millis(config.rate_limit.request_delay_ms),
            window_max_requests: config.rate_limit.window_max_requests,
            window: Duration::from_secs(config.rate_limit.window_secs),
            timeout: Duration::from_secs(config.rate_limit.timeout_secs),
        }
    }
}

impl AppConfig {
    /// Resolve the data directory, expanding a leading `~`.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.defaults.data_dir)
    }

    /// Directory holding the per-stage retry queue files.
    pub fn errors_dir(&self) -> PathBuf {
        self.data_dir().join("errors")
    }

    /// Directory holding per-source raw-record snapshots.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir().join("snapshots")
    }

    /// Path to the libSQL database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("fightsync.db")
    }
}

/// Expand a leading `~/` against the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.fightsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FightSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.fightsync/fightsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FightSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FightSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FightSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FightSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FightSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("similarity_threshold"));
        assert!(toml_str.contains("request_delay_ms"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.workers, 4);
        assert_eq!(parsed.defaults.retry_workers, 2);
        assert_eq!(parsed.matching.similarity_threshold, 0.70);
        assert_eq!(parsed.database.batch_size, 500);
    }

    #[test]
    fn config_with_overrides_and_sources() {
        let toml_str = r#"
[matching]
similarity_threshold = 0.8

[[matching.overrides]]
name = "Weili Zhang"
alias = "Zhang Weili"

[sources]
roster = "https://feeds.example.com/roster.json"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.matching.similarity_threshold, 0.8);
        assert_eq!(config.matching.overrides.len(), 1);
        assert_eq!(config.matching.overrides[0].alias.as_deref(), Some("Zhang Weili"));
        assert_eq!(
            config.sources.get("roster").map(String::as_str),
            Some("https://feeds.example.com/roster.json")
        );
    }

    #[test]
    fn fetch_config_from_app_config() {
        let app = AppConfig::default();
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.workers, 4);
        assert_eq!(fetch.retry_workers, 2);
        assert_eq!(fetch.min_delay, Duration::from_millis(1000));
        assert_eq!(fetch.timeout, Duration::from_secs(30));
    }

    #[test]
    fn data_paths_derive_from_data_dir() {
        let mut config = AppConfig::default();
        config.defaults.data_dir = "/tmp/fs-test".into();
        assert_eq!(config.errors_dir(), PathBuf::from("/tmp/fs-test/errors"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/fs-test/fightsync.db"));
    }
}
