//! Configuration system for quantgrid workers.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $QUANTGRID_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/quantgrid/config.toml
//!   3. ~/.config/quantgrid/config.toml

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration, built once at worker startup and passed to the
/// node, cache source, and executor at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub node: NodeSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Max jobs executing at once. 0 = available parallelism.
    pub max_concurrent_jobs: u32,
    /// Host name used in node identifiers. Empty = auto-detect.
    pub host_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Shared partitions retained across view cycles. The oldest cycle's
    /// partition is dropped when a new cycle would exceed this. 0 = unlimited.
    pub retain_cycles: u32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 0,
            host_name: String::new(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { retain_cycles: 4 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_or_tmp().join(".config"))
        .join("quantgrid")
}

fn home_or_tmp() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GridConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GridConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("QUANTGRID_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply QUANTGRID_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUANTGRID_NODE__MAX_CONCURRENT_JOBS") {
            if let Ok(n) = v.parse() {
                self.node.max_concurrent_jobs = n;
            }
        }
        if let Ok(v) = std::env::var("QUANTGRID_NODE__HOST_NAME") {
            self.node.host_name = v;
        }
        if let Ok(v) = std::env::var("QUANTGRID_CACHE__RETAIN_CYCLES") {
            if let Ok(n) = v.parse() {
                self.cache.retain_cycles = n;
            }
        }
    }
}
