//! Configuration management for chart-continuity
//!
//! Handles loading, saving, and validating configuration from TOML files,
//! including the registry of tracked charts.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL used to resolve relative track links
    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,

    /// HTTP fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Tracked charts
    #[serde(default = "default_charts")]
    pub charts: Vec<ChartConfig>,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// HTTP fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User agent string
    #[serde(default = "default_fetch_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per page (first try included)
    #[serde(default = "default_fetch_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_fetch_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum entries extracted per chart page
    #[serde(default = "default_ingest_expected_entries")]
    pub expected_entries: usize,

    /// Charts fetched and parsed concurrently (persistence stays sequential)
    #[serde(default = "default_ingest_concurrency")]
    pub concurrency: usize,

    /// Characters of a failing payload kept for diagnosis
    #[serde(default = "default_ingest_debug_payload_max_chars")]
    pub debug_payload_max_chars: usize,
}

/// A tracked chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub id: String,
    /// "top100" or "hype"
    pub chart_type: String,
    pub genre_slug: String,
    pub name: String,
    pub url: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for continuity data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Path of the rendered HTML report
    pub report_file: PathBuf,

    /// Directory for raw payloads that failed to parse
    pub debug_dir: PathBuf,
}

impl PathsConfig {
    fn under(base: &Path, config_file: PathBuf) -> Self {
        Self {
            config_file,
            db_file: base.join("continuity.sqlite"),
            report_file: base.join("report").join("index.html"),
            debug_dir: base.join("debug"),
            base_dir: base.to_path_buf(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_base_url: default_site_base_url(),
            fetch: FetchConfig::default(),
            ingest: IngestConfig::default(),
            charts: default_charts(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_fetch_user_agent(),
            timeout_secs: default_fetch_timeout(),
            retry_attempts: default_fetch_retry_attempts(),
            retry_base_delay_ms: default_fetch_retry_base_delay_ms(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            expected_entries: default_ingest_expected_entries(),
            concurrency: default_ingest_concurrency(),
            debug_payload_max_chars: default_ingest_debug_payload_max_chars(),
        }
    }
}

impl Config {
    /// Get the default base directory (~/.continuity)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".continuity")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig::under(&base, base.join("config.toml"));
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new("."));
        config.paths = PathsConfig::under(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.site_base_url)
            .map_err(|e| Error::Config(format!("site_base_url is not a valid URL: {}", e)))?;

        if self.fetch.timeout_secs == 0 {
            return Err(Error::Config(
                "fetch.timeout_secs must be positive".to_string(),
            ));
        }

        if self.fetch.retry_attempts == 0 {
            return Err(Error::Config(
                "fetch.retry_attempts must be at least 1".to_string(),
            ));
        }

        if self.ingest.expected_entries == 0 {
            return Err(Error::Config(
                "ingest.expected_entries must be at least 1".to_string(),
            ));
        }

        if self.ingest.concurrency == 0 {
            return Err(Error::Config(
                "ingest.concurrency must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for chart in &self.charts {
            if !seen.insert(chart.id.as_str()) {
                return Err(Error::Config(format!("Duplicate chart id: {}", chart.id)));
            }
            if !matches!(chart.chart_type.as_str(), "top100" | "hype") {
                return Err(Error::Config(format!(
                    "Chart '{}' has unknown chart_type '{}' (expected top100 or hype)",
                    chart.id, chart.chart_type
                )));
            }
            Url::parse(&chart.url).map_err(|e| {
                Error::Config(format!("Chart '{}' has invalid url: {}", chart.id, e))
            })?;
        }

        Ok(())
    }
}
