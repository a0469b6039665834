//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-search\config.toml
//! - macOS: ~/Library/Application Support/music-search/config.toml
//! - Linux: ~/.config/music-search/config.toml
//!
//! Ranking parameters are hot-reloadable: the search path never reads
//! [`RankingConfig`] directly, it asks a [`RankingConfigProvider`] for the
//! current snapshot. [`SharedRankingConfig`] swaps snapshots atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::platform;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache tier sizes and TTLs
    pub cache: CacheConfig,

    /// Scoring and tie-break parameters
    pub ranking: RankingConfig,

    /// Background enhancement settings
    pub background: BackgroundConfig,

    /// Background indexing settings
    pub indexing: IndexingConfig,

    /// Local datastore settings
    pub database: DatabaseConfig,
}

/// Cache tier settings. TTLs are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries in the in-process LRU
    pub memory_capacity: usize,
    pub memory_ttl_secs: u64,
    /// Durable per-query tier
    pub store_ttl_secs: u64,
    /// Per-item tier
    pub item_ttl_secs: u64,
    /// Shorter TTL for "no results" entries
    pub negative_ttl_secs: u64,
    /// Directory for the on-disk item tier (None = in-memory item tier)
    pub item_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 1000,
            memory_ttl_secs: 15 * 60,
            store_ttl_secs: 24 * 60 * 60,
            item_ttl_secs: 6 * 60 * 60,
            negative_ttl_secs: 5 * 60,
            item_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs)
    }

    pub fn item_ttl(&self) -> Duration {
        Duration::from_secs(self.item_ttl_secs)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_secs)
    }
}

/// Ranking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Score differences below this are ties
    pub tie_epsilon: f64,
    /// Multiplier applied to popularity before it joins the text score
    pub popularity_scale: f64,
    /// Preference multiplier per platform
    pub platform_weights: HashMap<String, f64>,
    /// Preference multiplier for platforms missing from `platform_weights`
    pub default_platform_weight: f64,
    /// Weight of each platform when averaging popularity for one ISRC.
    /// Zero excludes the platform.
    pub aggregate_weights: HashMap<String, f64>,
    /// Aggregate weight for platforms missing from `aggregate_weights`
    pub default_aggregate_weight: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        let platform_weights = [
            (platform::LOCAL, 1.2),
            (platform::SPOTIFY, 1.1),
            (platform::APPLE_MUSIC, 1.05),
            (platform::TIDAL, 1.0),
            (platform::DEEZER, 0.95),
        ];
        // Apple Music exposes no comparable popularity figure.
        let aggregate_weights = [
            (platform::LOCAL, 1.0),
            (platform::SPOTIFY, 1.0),
            (platform::TIDAL, 0.8),
            (platform::DEEZER, 0.8),
            (platform::APPLE_MUSIC, 0.0),
        ];

        Self {
            tie_epsilon: 2.5,
            popularity_scale: 0.8,
            platform_weights: platform_weights
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            default_platform_weight: 1.0,
            aggregate_weights: aggregate_weights
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            default_aggregate_weight: 0.5,
        }
    }
}

impl RankingConfig {
    /// Preference multiplier for a platform. Negative values are treated as 0.
    pub fn platform_weight(&self, platform: &str) -> f64 {
        self.platform_weights
            .get(platform)
            .copied()
            .unwrap_or(self.default_platform_weight)
            .max(0.0)
    }

    /// Aggregate-popularity weight for a platform, clamped to 0..=1.
    pub fn aggregate_weight(&self, platform: &str) -> f64 {
        self.aggregate_weights
            .get(platform)
            .copied()
            .unwrap_or(self.default_aggregate_weight)
            .clamp(0.0, 1.0)
    }
}

/// Background enhancement and worker-pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enabled: bool,
    /// Concurrent background workers
    pub workers: usize,
    /// Queued jobs beyond this are rejected
    pub queue_capacity: usize,
    /// Per-job timeout
    pub task_timeout_secs: u64,
    /// Platforms every grouped result should link to
    pub tracked_platforms: Vec<String>,
    /// Minimum similarity (0-100) for a fallback-search candidate
    pub acceptance_threshold: f64,
    /// Health probe timeout for platform sources
    pub health_timeout_ms: u64,
    /// Per-source search timeout
    pub source_timeout_ms: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 4,
            queue_capacity: 256,
            task_timeout_secs: 15,
            tracked_platforms: vec![
                platform::SPOTIFY.to_string(),
                platform::APPLE_MUSIC.to_string(),
                platform::TIDAL.to_string(),
            ],
            acceptance_threshold: 70.0,
            health_timeout_ms: 2000,
            source_timeout_ms: 8000,
        }
    }
}

impl BackgroundConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

/// Background indexing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub enabled: bool,
    /// Candidates persisted per query
    pub top_n: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_n: 5,
        }
    }
}

/// Local datastore settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file (None = `music_search.db` in the working directory)
    pub path: Option<PathBuf>,
}

// ============================================================================
// Ranking Config Provider
// ============================================================================

/// Read accessor for the current ranking configuration.
///
/// Implementations may change the snapshot between calls; consumers take
/// one snapshot per ranking pass.
pub trait RankingConfigProvider: Send + Sync {
    fn snapshot(&self) -> Arc<RankingConfig>;
}

/// A fixed configuration, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRankingConfig(Arc<RankingConfig>);

impl StaticRankingConfig {
    pub fn new(config: RankingConfig) -> Self {
        Self(Arc::new(config))
    }
}

impl RankingConfigProvider for StaticRankingConfig {
    fn snapshot(&self) -> Arc<RankingConfig> {
        Arc::clone(&self.0)
    }
}

/// Hot-swappable ranking configuration.
#[derive(Debug, Default)]
pub struct SharedRankingConfig {
    current: RwLock<Arc<RankingConfig>>,
}

impl SharedRankingConfig {
    pub fn new(config: RankingConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Swap in a new snapshot. Readers holding the old one keep it.
    pub fn replace(&self, config: RankingConfig) {
        *self.current.write() = Arc::new(config);
    }

    /// Re-read the `[ranking]` table of a config file.
    ///
    /// The current snapshot is kept if the file can't be read or parsed.
    pub fn reload_from(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: Config = toml::from_str(&contents).map_err(ConfigError::Parse)?;
        self.replace(config.ranking);
        tracing::info!("Reloaded ranking config from {:?}", path);
        Ok(())
    }
}

impl RankingConfigProvider for SharedRankingConfig {
    fn snapshot(&self) -> Arc<RankingConfig> {
        Arc::clone(&self.current.read())
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-search"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to a specific file, atomically.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write to temp, then rename
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
