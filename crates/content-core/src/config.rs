//! Configuration loading and management (spec §6 "Environment / config").
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `~/.config/content-core/config.toml`
//! 3. Project config: `./.content-core/config.toml`
//! 4. Environment variables: `CONTENT_CORE_*`
//!
//! # Hot-Reload
//!
//! Long-running hosts (a server embedding a `WorkspaceCoordinator` for the
//! lifetime of the process) should use [`ConfigManager`] to pick up edits to
//! either config file without a restart.
//!
//! # Example Config
//!
//! ```toml
//! hierarchy_cache_capacity = 10000
//!
//! [change_feed]
//! behaviour = "observation"
//! poll_timeout_ms = 30000
//!
//! [node_types]
//! root_node_definition = "rep:root"
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use notify::Watcher;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use crate::{workspace::CacheBehaviour, Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

/// Root configuration record, built explicitly by [`load_config`] and handed
/// to constructors (Design Notes §9: "context injection" — no global
/// statics besides the immutable name-interning pool in [`crate::names`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Upper-limit entry count for the caching Hierarchy Manager's LRU path
    /// cache (spec §4.2, default 10 000).
    pub hierarchy_cache_capacity: usize,
    /// What the Workspace Coordinator's change feed does at construction.
    pub change_feed: ChangeFeedConfig,
    /// What the Node-Type Registry reads at construction.
    pub node_types: NodeTypeConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChangeFeedConfig {
    /// `Invalidate` | `Observation` (spec §6).
    pub behaviour: CacheBehaviour,
    /// Per-iteration timeout passed to `getEvents` (spec §5 "Cancellation
    /// and timeouts").
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeTypeConfig {
    /// Prefixed-text `QName` of the root node's primary type, used to seed
    /// the registry's root-node-definition descriptor (spec §4.4, §6).
    pub root_node_definition: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hierarchy_cache_capacity: 10_000,
            change_feed: ChangeFeedConfig::default(),
            node_types: NodeTypeConfig::default(),
        }
    }
}

impl Default for ChangeFeedConfig {
    fn default() -> Self {
        Self {
            behaviour: CacheBehaviour::Invalidate,
            poll_timeout_ms: 30_000,
        }
    }
}

impl Default for NodeTypeConfig {
    fn default() -> Self {
        Self {
            root_node_definition: "rep:root".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PARTIAL CONFIG (explicit-key merge semantics)
// ═══════════════════════════════════════════════════════════════════════════

/// Partial configuration with `Option<T>` fields for explicit-key merge
/// semantics: a config file that sets only `hierarchy_cache_capacity` must
/// not reset `change_feed`/`node_types` back to their defaults when merged
/// on top of an already-loaded [`Config`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialConfig {
    #[serde(default)]
    pub hierarchy_cache_capacity: Option<usize>,
    #[serde(default)]
    pub change_feed: Option<PartialChangeFeedConfig>,
    #[serde(default)]
    pub node_types: Option<PartialNodeTypeConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialChangeFeedConfig {
    #[serde(default)]
    pub behaviour: Option<CacheBehaviour>,
    #[serde(default)]
    pub poll_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialNodeTypeConfig {
    #[serde(default)]
    pub root_node_definition: Option<String>,
}

impl ChangeFeedConfig {
    fn merge_partial(&mut self, partial: PartialChangeFeedConfig) {
        if let Some(behaviour) = partial.behaviour {
            self.behaviour = behaviour;
        }
        if let Some(poll_timeout_ms) = partial.poll_timeout_ms {
            self.poll_timeout_ms = poll_timeout_ms;
        }
    }
}

impl NodeTypeConfig {
    fn merge_partial(&mut self, partial: PartialNodeTypeConfig) {
        if let Some(root_node_definition) = partial.root_node_definition {
            self.root_node_definition = root_node_definition;
        }
    }
}

impl Config {
    /// Merge a partial config into this one using explicit-key semantics:
    /// only fields that are `Some(value)` in `partial` override `self`.
    pub fn merge_partial(&mut self, partial: PartialConfig) {
        if let Some(capacity) = partial.hierarchy_cache_capacity {
            self.hierarchy_cache_capacity = capacity;
        }
        if let Some(change_feed) = partial.change_feed {
            self.change_feed.merge_partial(change_feed);
        }
        if let Some(node_types) = partial.node_types {
            self.node_types.merge_partial(node_types);
        }
    }

    /// Apply `CONTENT_CORE_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that fails to parse.
    fn apply_env_vars(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("CONTENT_CORE_HIERARCHY_CACHE_CAPACITY") {
            self.hierarchy_cache_capacity = value.parse().map_err(|e| {
                Error::InvalidConfig(format!(
                    "invalid CONTENT_CORE_HIERARCHY_CACHE_CAPACITY value: {e}"
                ))
            })?;
        }
        if let Ok(value) = std::env::var("CONTENT_CORE_CHANGE_FEED_BEHAVIOUR") {
            self.change_feed.behaviour = value.parse()?;
        }
        if let Ok(value) = std::env::var("CONTENT_CORE_CHANGE_FEED_POLL_TIMEOUT_MS") {
            self.change_feed.poll_timeout_ms = value.parse().map_err(|e| {
                Error::InvalidConfig(format!(
                    "invalid CONTENT_CORE_CHANGE_FEED_POLL_TIMEOUT_MS value: {e}"
                ))
            })?;
        }
        if let Ok(value) = std::env::var("CONTENT_CORE_NODE_TYPES_ROOT_NODE_DEFINITION") {
            self.node_types.root_node_definition = value;
        }
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    fn validate(&self) -> Result<()> {
        if self.hierarchy_cache_capacity == 0 {
            return Err(Error::InvalidConfig(
                "hierarchy_cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.change_feed.poll_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "change_feed.poll_timeout_ms must be greater than 0 (a zero timeout busy-loops the poll worker)".to_string(),
            ));
        }
        if self.node_types.root_node_definition.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "node_types.root_node_definition must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIG KEY VALIDATION
// ═══════════════════════════════════════════════════════════════════════════

/// All valid configuration keys in dot-notation. Any key in a config file
/// not covered by this list is rejected with a helpful error, so a typo'd
/// key fails loudly instead of being silently ignored.
const VALID_KEYS: &[&str] = &[
    "hierarchy_cache_capacity",
    "change_feed",
    "change_feed.behaviour",
    "change_feed.poll_timeout_ms",
    "node_types",
    "node_types.root_node_definition",
];

/// Validate a configuration key against [`VALID_KEYS`].
///
/// # Errors
///
/// Returns `Error::InvalidConfig` if the key is not recognized.
pub fn validate_key(key: &str) -> Result<()> {
    let is_valid = VALID_KEYS
        .iter()
        .any(|valid_key| key == *valid_key || valid_key.starts_with(&format!("{key}.")));

    if is_valid {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "unknown configuration key: '{key}'. Valid keys: {}",
            VALID_KEYS.join(", ")
        )))
    }
}

/// Extract all keys from a TOML value in dot-notation.
fn extract_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let toml::Value::Table(table) = value {
        for (key, val) in table {
            let full_key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            keys.push(full_key.clone());
            if let toml::Value::Table(_) = val {
                keys.extend(extract_keys(val, &full_key));
            }
        }
    }
    keys
}

fn validate_toml_keys(value: &toml::Value) -> Result<()> {
    for key in extract_keys(value, "") {
        validate_key(&key)?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576; // 1 MB

/// Load configuration from all sources with hierarchy.
///
/// For long-running hosts that need hot-reload, use [`ConfigManager`]
/// instead.
///
/// # Errors
///
/// Returns an error if a config file is malformed TOML, contains an
/// unknown key, or fails validation.
pub async fn load_config() -> Result<Config> {
    let mut config = Config::default();

    if let Ok(global_path) = global_config_path() {
        match load_partial_toml_file(&global_path).await {
            Ok(partial) => config.merge_partial(partial),
            Err(Error::IoError(_)) => {}
            Err(e) => return Err(e),
        }
    }

    if let Ok(project_path) = project_config_path() {
        match load_partial_toml_file(&project_path).await {
            Ok(partial) => config.merge_partial(partial),
            Err(Error::IoError(_)) => {}
            Err(e) => return Err(e),
        }
    }

    config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

/// Load a TOML file into a [`PartialConfig`], rejecting unknown keys and
/// refusing to follow symlinks.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, exceeds
/// [`MAX_CONFIG_FILE_SIZE`], or contains an unrecognized key.
pub async fn load_partial_toml_file(path: &std::path::Path) -> Result<PartialConfig> {
    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|e| Error::IoError(format!("failed to stat config file {}: {e}", path.display())))?;

    if metadata.is_symlink() {
        return Err(Error::InvalidConfig(format!(
            "config file {} is a symbolic link - refusing to follow for security",
            path.display()
        )));
    }
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(Error::InvalidConfig(format!(
            "config file {} exceeds maximum size of {MAX_CONFIG_FILE_SIZE} bytes",
            path.display()
        )));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::IoError(format!("failed to read config file {}: {e}", path.display())))?;

    let value: toml::Value = toml::from_str(&content)
        .map_err(|e| Error::ParseError(format!("failed to parse config file {}: {e}", path.display())))?;
    validate_toml_keys(&value)?;

    toml::from_str(&content)
        .map_err(|e| Error::ParseError(format!("failed to parse config file {}: {e}", path.display())))
}

fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".content-core/config.toml"))
        .map_err(|e| Error::IoError(format!("failed to get current directory: {e}")))
}

fn global_config_path() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "content-core")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .ok_or_else(|| Error::IoError("failed to determine global config directory".to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIG MANAGER (HOT-RELOAD)
// ═══════════════════════════════════════════════════════════════════════════

/// Thread-safe, reloadable configuration for long-running hosts. Watches
/// the global and project config files and reloads when either changes,
/// keeping the last known-good config on a reload failure.
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// Load the initial config and spawn the watcher task.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial [`load_config`] call fails.
    pub async fn new() -> Result<Self> {
        let config = load_config().await?;
        let inner = Arc::new(RwLock::new(config));

        let watched = inner.clone();
        let mut file_events = Self::watch_config_files();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = file_events.recv() => {
                        tokio::time::sleep(Duration::from_millis(150)).await;
                        match load_config().await {
                            Ok(new_config) => {
                                *watched.write().await = new_config;
                                tracing::info!("config reloaded");
                            }
                            Err(e) => {
                                tracing::warn!("config reload failed: {e}, keeping previous config");
                            }
                        }
                    }
                    else => break,
                }
            }
        });

        Ok(Self { inner })
    }

    /// A fast, non-blocking read of the most recently (re)loaded config.
    pub async fn get(&self) -> Config {
        self.inner.read().await.clone()
    }

    fn watch_config_files() -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel::<()>(4);

        tokio::spawn(async move {
            let mut paths = Vec::new();
            if let Ok(global) = global_config_path() {
                paths.push(global);
            }
            if let Ok(project) = project_config_path() {
                paths.push(project);
            }
            if paths.is_empty() {
                return;
            }

            let Ok(mut watcher) = notify::recommended_watcher(
                move |res: std::result::Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        if event.kind.is_modify() || event.kind.is_create() {
                            let _ = tx.blocking_send(());
                        }
                    }
                },
            ) else {
                return;
            };

            for path in paths {
                if watcher.watch(&path, notify::RecursiveMode::NonRecursive).is_err() {
                    if let Some(parent) = path.parent() {
                        let _ = watcher.watch(parent, notify::RecursiveMode::NonRecursive);
                    }
                }
            }

            tokio::time::sleep(Duration::from_secs(u64::MAX)).await;
        });

        rx
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_config_files_returns_defaults() {
        let config = load_config().await.expect("defaults always load");
        assert_eq!(config.hierarchy_cache_capacity, 10_000);
        assert_eq!(config.change_feed.behaviour, CacheBehaviour::Invalidate);
    }

    #[test]
    fn merge_partial_only_overrides_present_fields() {
        let mut config = Config::default();
        let partial = PartialConfig {
            hierarchy_cache_capacity: Some(500),
            change_feed: None,
            node_types: None,
        };
        config.merge_partial(partial);
        assert_eq!(config.hierarchy_cache_capacity, 500);
        assert_eq!(config.change_feed.poll_timeout_ms, 30_000);
    }

    #[test]
    #[serial_test::serial(content_core_config_env)]
    fn env_var_overrides_config() {
        std::env::set_var("CONTENT_CORE_HIERARCHY_CACHE_CAPACITY", "42");
        let mut config = Config::default();
        config.apply_env_vars().expect("valid integer");
        assert_eq!(config.hierarchy_cache_capacity, 42);
        std::env::remove_var("CONTENT_CORE_HIERARCHY_CACHE_CAPACITY");
    }

    #[test]
    #[serial_test::serial(content_core_config_env)]
    fn invalid_env_var_value_is_rejected() {
        std::env::set_var("CONTENT_CORE_CHANGE_FEED_BEHAVIOUR", "nonsense");
        let mut config = Config::default();
        let result = config.apply_env_vars();
        assert!(result.is_err());
        std::env::remove_var("CONTENT_CORE_CHANGE_FEED_BEHAVIOUR");
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let mut config = Config::default();
        config.hierarchy_cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_poll_timeout_fails_validation() {
        let mut config = Config::default();
        config.change_feed.poll_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_keys_accepted() {
        for key in [
            "hierarchy_cache_capacity",
            "change_feed.behaviour",
            "change_feed.poll_timeout_ms",
            "node_types.root_node_definition",
        ] {
            assert!(validate_key(key).is_ok(), "key '{key}' should be valid");
        }
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(validate_key("typo_key").is_err());
    }

    #[tokio::test]
    async fn malformed_toml_returns_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, b"hierarchy_cache_capacity = \n invalid toml [[[")
            .await
            .expect("write");
        let result = load_partial_toml_file(&path).await;
        assert!(matches!(result, Err(Error::ParseError(_))));
    }

    #[tokio::test]
    async fn unknown_key_in_file_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("unknown.toml");
        tokio::fs::write(&path, b"typo_key = \"oops\"\n")
            .await
            .expect("write");
        let result = load_partial_toml_file(&path).await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
