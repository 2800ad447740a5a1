//! TOML configuration for tipwatch.
//!
//! A layered model with sensible defaults: an explicit `--config` path, the
//! `TIPWATCH_CONFIG` environment variable, the standard system location, and
//! finally the compiled-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alerts::dispatch::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY};
use crate::alerts::{AlertConfig, Thresholds};
use crate::signals::MetricParams;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TIPWATCH_CONFIG";

/// Standard system location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/tipwatch/tipwatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub signals: MetricParams,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// First loadable file from [`search_paths`](Self::search_paths), else defaults.
    pub fn load_or_default() -> Self {
        for path in Self::search_paths() {
            match Self::load(&path) {
                Ok(cfg) => return cfg,
                Err(e) => warn!(
                    path = %path.display(),
                    error = %format!("{:#}", e),
                    "config file could not be loaded, trying next location"
                ),
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// `TIPWATCH_CONFIG` when set (even if missing, so the failure is reported),
    /// then the system path when it exists.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .into_iter()
            .collect();
        let system = PathBuf::from(SYSTEM_CONFIG_PATH);
        if system.exists() {
            paths.push(system);
        }
        paths
    }

    /// An explicit path must load; otherwise fall back to the usual search.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Where the image dataset is scanned from (first existing directory wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub dirs: Vec<PathBuf>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dirs: vec![
                PathBuf::from("/app/data/temp_extract/train"),
                PathBuf::from("/app/data/butterflies/train"),
                PathBuf::from("data/train"),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Initial alert subscription and delivery limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub webhook_target: Option<String>,
    pub notify_address: Option<String>,
    pub thresholds: Thresholds,
    pub webhook_timeout_secs: u64,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_target: None,
            notify_address: None,
            thresholds: Thresholds::default(),
            webhook_timeout_secs: 5,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl AlertsConfig {
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    /// Starting point for the evaluator; subscribe requests refine it later.
    pub fn initial(&self) -> AlertConfig {
        AlertConfig {
            webhook_target: None,
            notify_address: None,
            thresholds: self.thresholds,
            last_trigger: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub top_n: usize,
    /// Feed each species' latest variance/autocorrelation to the alert queue.
    pub auto_evaluate: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 600,
            top_n: 5,
            auto_evaluate: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
