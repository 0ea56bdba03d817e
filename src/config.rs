use crate::pricing::PriceEntry;
use crate::store::DEFAULT_DATABASE_URL;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from monitor.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub runner: RunnerConfig,
    pub pricing: PricingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub dir: PathBuf,
    pub glob: String,
    pub processed_prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub poll_seconds: u64,
    pub debug: bool,
}

/// Extra per-token rates layered over the built-in price table.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PricingConfig {
    pub models: Vec<PriceEntry>,
}

// --- Default implementations ---

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            glob: "*.json".to_string(),
            processed_prefix: "_".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_seconds: 2,
            debug: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl MonitorConfig {
    /// Load from `path`. A missing file yields defaults; an unreadable or
    /// malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DATABASE_URL") {
            self.store.database_url = url;
        }
        if let Some(dir) = var("LOGS_DIR") {
            self.source.dir = PathBuf::from(dir);
        }
        if let Some(glob) = var("FILE_GLOB") {
            self.source.glob = glob;
        }
        if let Some(prefix) = var("PROCESSED_PREFIX") {
            self.source.processed_prefix = prefix;
        }
        if let Some(raw) = var("POLL_SECONDS") {
            match raw.trim().parse() {
                Ok(secs) => self.runner.poll_seconds = secs,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid POLL_SECONDS"),
            }
        }
        if let Some(raw) = var("MONITOR_DEBUG") {
            self.runner.debug = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }
}
