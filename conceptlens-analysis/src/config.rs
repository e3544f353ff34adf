//! Configuration resolution for conceptlens-analysis
//!
//! Priority: command line → environment → TOML → compiled default.
//! Clap covers the first two tiers; the TOML tier comes from
//! `conceptlens_common::config`.

use clap::Parser;
use conceptlens_common::config::{
    default_database_path, AnalyticsMode, SeedOrder, SimilarityMetric, TomlConfig,
    DEFAULT_BIND_ADDRESS,
};
use conceptlens_common::{Error, Result};
use std::path::PathBuf;

/// Default seed-similarity threshold
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Default number of analysis workers
pub const DEFAULT_WORKERS: usize = 2;

/// Default event bus capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Command-line / environment tier
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "conceptlens-analysis",
    version,
    about = "Misconception analysis service: grading, clustering, triage and reports"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "CONCEPTLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "CONCEPTLENS_DATABASE")]
    pub database: Option<PathBuf>,

    /// HTTP bind address (host:port)
    #[arg(long, env = "CONCEPTLENS_BIND")]
    pub bind: Option<String>,

    /// Analytics mode: demo (min cluster size 1) or production (2)
    #[arg(long, env = "CONCEPTLENS_ANALYTICS_MODE")]
    pub analytics_mode: Option<AnalyticsMode>,

    /// Number of background analysis workers
    #[arg(long, env = "CONCEPTLENS_WORKERS")]
    pub workers: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, env = "CONCEPTLENS_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Confidence score as a function of cluster size
///
/// `score = base + per_member * size`, optionally clamped to `ceiling`.
/// Valid ranges: `base` within [0, 1], `per_member` ≥ 0, `ceiling` ≥ `base`.
/// The default has no ceiling, so large clusters score above 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceScoring {
    pub base: f64,
    pub per_member: f64,
    pub ceiling: Option<f64>,
}

impl Default for ConfidenceScoring {
    fn default() -> Self {
        Self {
            base: 0.5,
            per_member: 0.05,
            ceiling: None,
        }
    }
}

impl ConfidenceScoring {
    pub fn score(&self, cluster_size: usize) -> f64 {
        let raw = self.base + self.per_member * cluster_size as f64;
        match self.ceiling {
            Some(ceiling) => raw.min(ceiling),
            None => raw,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.base) {
            return Err(Error::Config(format!(
                "confidence base must be within [0, 1], got {}",
                self.base
            )));
        }
        if !self.per_member.is_finite() || self.per_member < 0.0 {
            return Err(Error::Config(format!(
                "confidence per-member increment must be >= 0, got {}",
                self.per_member
            )));
        }
        if let Some(ceiling) = self.ceiling {
            if !ceiling.is_finite() || ceiling < self.base {
                return Err(Error::Config(format!(
                    "confidence ceiling must be >= base ({}), got {}",
                    self.base, ceiling
                )));
            }
        }
        Ok(())
    }
}

/// Parameters of one clustering call
///
/// Passed explicitly into every call; nothing reads ambient state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusteringConfig {
    /// Minimum seed similarity (0.0 - 1.0) to join a cluster
    pub similarity_threshold: f64,
    /// Smallest cluster that is reported
    pub min_cluster_size: usize,
    pub metric: SimilarityMetric,
    pub seed_order: SeedOrder,
    pub scoring: ConfidenceScoring,
}

impl ClusteringConfig {
    pub fn for_mode(mode: AnalyticsMode) -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_cluster_size: mode.default_min_cluster_size(),
            metric: SimilarityMetric::default(),
            seed_order: SeedOrder::default(),
            scoring: ConfidenceScoring::default(),
        }
    }

    pub fn with_threshold(mut self, similarity_threshold: f64) -> Self {
        self.similarity_threshold = similarity_threshold;
        self
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarity threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.min_cluster_size == 0 {
            return Err(Error::Config(
                "min cluster size must be at least 1".to_string(),
            ));
        }
        self.scoring.validate()
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self::for_mode(AnalyticsMode::default())
    }
}

/// Background analysis settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisSettings {
    pub workers: usize,
    /// Flag clustered responses; a question is re-clustered only once new ones arrive
    pub mark_processed: bool,
    pub event_capacity: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            mark_processed: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    pub bind_address: String,
    pub analytics_mode: AnalyticsMode,
    pub clustering: ClusteringConfig,
    pub analysis: AnalysisSettings,
    pub log_level: String,
}

impl ServiceConfig {
    /// Merge the CLI/ENV tier over the TOML tier over compiled defaults
    pub fn resolve(cli: &Cli, toml: &TomlConfig) -> Result<Self> {
        let analytics_mode = cli
            .analytics_mode
            .or(toml.analytics_mode)
            .unwrap_or_default();

        let mut clustering = ClusteringConfig::for_mode(analytics_mode);
        let section = &toml.clustering;
        if let Some(threshold) = section.similarity_threshold {
            clustering.similarity_threshold = threshold;
        }
        if let Some(min_size) = section.min_cluster_size {
            clustering.min_cluster_size = min_size;
        }
        if let Some(metric) = section.metric {
            clustering.metric = metric;
        }
        if let Some(seed_order) = section.seed_order {
            clustering.seed_order = seed_order;
        }
        clustering.scoring.ceiling = section.confidence_ceiling;
        clustering.validate()?;

        let defaults = AnalysisSettings::default();
        let analysis = AnalysisSettings {
            workers: cli
                .workers
                .or(toml.analysis.workers)
                .unwrap_or(defaults.workers),
            mark_processed: toml.analysis.mark_processed.unwrap_or(defaults.mark_processed),
            event_capacity: toml
                .analysis
                .event_capacity
                .unwrap_or(defaults.event_capacity),
        };
        if analysis.workers == 0 {
            return Err(Error::Config("at least one analysis worker is required".to_string()));
        }
        if analysis.event_capacity == 0 {
            return Err(Error::Config("event capacity must be at least 1".to_string()));
        }

        Ok(Self {
            database_path: cli
                .database
                .clone()
                .or_else(|| toml.database_path.clone())
                .unwrap_or_else(default_database_path),
            bind_address: cli
                .bind
                .clone()
                .or_else(|| toml.bind_address.clone())
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            analytics_mode,
            clustering,
            analysis,
            log_level: cli
                .log_level
                .clone()
                .unwrap_or_else(|| toml.logging.level.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scoring_is_uncapped_and_monotonic() {
        let scoring = ConfidenceScoring::default();
        assert!((scoring.score(1) - 0.55).abs() < 1e-9);
        assert!((scoring.score(15) - 1.25).abs() < 1e-9);

        let scores: Vec<f64> = (1..50).map(|n| scoring.score(n)).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_ceiling_clamps_but_stays_monotonic() {
        let scoring = ConfidenceScoring {
            ceiling: Some(1.0),
            ..ConfidenceScoring::default()
        };
        assert_eq!(scoring.score(100), 1.0);

        let scores: Vec<f64> = (1..50).map(|n| scoring.score(n)).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_scoring_validation_ranges() {
        assert!(ConfidenceScoring::default().validate().is_ok());
        assert!(ConfidenceScoring { base: 1.5, ..Default::default() }.validate().is_err());
        assert!(ConfidenceScoring { per_member: -0.1, ..Default::default() }.validate().is_err());
        assert!(ConfidenceScoring { ceiling: Some(0.2), ..Default::default() }.validate().is_err());
    }

    #[test]
    fn test_mode_selects_min_cluster_size() {
        assert_eq!(ClusteringConfig::for_mode(AnalyticsMode::Demo).min_cluster_size, 1);
        assert_eq!(ClusteringConfig::for_mode(AnalyticsMode::Production).min_cluster_size, 2);
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = Cli {
            analytics_mode: Some(AnalyticsMode::Production),
            workers: Some(8),
            bind: Some("0.0.0.0:9000".to_string()),
            ..Cli::default()
        };
        let toml = TomlConfig {
            analytics_mode: Some(AnalyticsMode::Demo),
            bind_address: Some("127.0.0.1:1".to_string()),
            ..TomlConfig::default()
        };

        let config = ServiceConfig::resolve(&cli, &toml).unwrap();

        assert_eq!(config.analytics_mode, AnalyticsMode::Production);
        assert_eq!(config.clustering.min_cluster_size, 2);
        assert_eq!(config.analysis.workers, 8);
        assert_eq!(config.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn test_toml_clustering_overrides_mode_default() {
        let mut toml = TomlConfig {
            analytics_mode: Some(AnalyticsMode::Production),
            ..TomlConfig::default()
        };
        toml.clustering.min_cluster_size = Some(3);
        toml.clustering.similarity_threshold = Some(0.8);
        toml.clustering.confidence_ceiling = Some(1.0);

        let config = ServiceConfig::resolve(&Cli::default(), &toml).unwrap();

        assert_eq!(config.clustering.min_cluster_size, 3);
        assert_eq!(config.clustering.similarity_threshold, 0.8);
        assert_eq!(config.clustering.scoring.ceiling, Some(1.0));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut toml = TomlConfig::default();
        toml.clustering.similarity_threshold = Some(1.5);

        assert!(ServiceConfig::resolve(&Cli::default(), &toml).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = Cli {
            workers: Some(0),
            ..Cli::default()
        };
        assert!(ServiceConfig::resolve(&cli, &TomlConfig::default()).is_err());
    }
}
