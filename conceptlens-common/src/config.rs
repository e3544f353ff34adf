//! Configuration file loading and default path resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Steps 1 and 2 belong to each service binary; this module owns the TOML
//! schema and the defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable naming an explicit TOML config file
pub const CONFIG_ENV_VAR: &str = "CONCEPTLENS_CONFIG";

/// Default HTTP bind address for the analysis service
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";

/// Analytics mode switch
///
/// Only selects defaults; the resolved values are handed to clustering calls
/// explicitly, never read back from here at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsMode {
    /// Relaxed: single-response clusters are reported
    #[default]
    Demo,
    /// Strict: a cluster needs at least two responses
    Production,
}

impl AnalyticsMode {
    pub fn default_min_cluster_size(&self) -> usize {
        match self {
            AnalyticsMode::Demo => 1,
            AnalyticsMode::Production => 2,
        }
    }
}

impl FromStr for AnalyticsMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(AnalyticsMode::Demo),
            "production" => Ok(AnalyticsMode::Production),
            other => Err(Error::Config(format!(
                "Unknown analytics mode '{}' (expected 'demo' or 'production')",
                other
            ))),
        }
    }
}

/// Text similarity ratio used to compare a response against a cluster seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// 1 - edit distance / longer length
    Levenshtein,
    /// Ratcliff/Obershelp gestalt ratio: 2 * matched / total length
    #[default]
    SequenceMatcher,
}

/// Order in which responses are offered to the greedy clustering pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedOrder {
    /// Submission timestamp ascending, ties broken by arrival
    #[default]
    Submission,
    /// Storage insertion order
    Arrival,
}

/// `[clustering]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSection {
    pub similarity_threshold: Option<f64>,
    pub min_cluster_size: Option<usize>,
    pub metric: Option<SimilarityMetric>,
    pub seed_order: Option<SeedOrder>,
    /// Upper clamp for confidence scores; absent means uncapped
    pub confidence_ceiling: Option<f64>,
}

/// `[analysis]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub workers: Option<usize>,
    pub mark_processed: Option<bool>,
    pub event_capacity: Option<usize>,
}

/// `[logging]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Contents of `conceptlens.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub database_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub analytics_mode: Option<AnalyticsMode>,
    #[serde(default)]
    pub clustering: ClusteringSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Locate the config file: explicit path → `CONCEPTLENS_CONFIG` → platform default
///
/// Only the platform default is checked for existence; an explicit path that
/// is missing is reported by [`load_config_or_default`].
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|p| p.exists())
}

/// `<config dir>/conceptlens/conceptlens.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("conceptlens").join("conceptlens.toml"))
}

/// Load the resolved config file, falling back to defaults when it is absent
///
/// A missing file is not fatal (warning + defaults). A file that exists but
/// cannot be parsed is an error.
pub fn load_config_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) if path.exists() => {
            let config = load_toml_config(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => Ok(TomlConfig::default()),
    }
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("conceptlens"))
        .unwrap_or_else(|| PathBuf::from("./conceptlens_data"))
        .join("conceptlens.db")
}
