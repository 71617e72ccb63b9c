//! Pipeline configuration
//!
//! Every stage receives its settings explicitly from a [`PipelineConfig`]; nothing
//! reads ambient defaults at run time.

use crate::error::RiskError;
use crate::rfm::parse_timestamp;
use chrono::NaiveDateTime;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for one pipeline run
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Reference time for recency; defaults to one day after the latest transaction
    pub snapshot: Option<String>,
    pub clustering: ClusteringConfig,
}

/// K-Means settings for the behavioral segmenter
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Number of clusters
    pub n_clusters: usize,
    /// Seed for centroid initialization
    pub seed: u64,
    /// Number of initialization restarts; the lowest-inertia run is kept
    pub n_init: usize,
    /// Maximum iterations per restart
    pub max_iters: u64,
    /// Convergence tolerance
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            seed: 42,
            n_init: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file layered with `RISKFORGE__*` environment variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("RISKFORGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Parsed snapshot override, if any
    pub fn snapshot_time(&self) -> crate::Result<Option<NaiveDateTime>> {
        self.snapshot
            .as_deref()
            .map(|raw| {
                parse_timestamp(raw).ok_or_else(|| RiskError::InvalidSnapshot(raw.to_string()))
            })
            .transpose()
    }

    pub fn validate(&self) -> crate::Result<()> {
        let c = &self.clustering;
        if c.n_clusters < 2 {
            return Err(RiskError::InvalidConfig(format!(
                "n_clusters must be at least 2, got {}",
                c.n_clusters
            )));
        }
        if c.n_init == 0 {
            return Err(RiskError::InvalidConfig("n_init must be at least 1".into()));
        }
        if c.max_iters == 0 {
            return Err(RiskError::InvalidConfig("max_iters must be at least 1".into()));
        }
        if c.tolerance.is_nan() || c.tolerance <= 0.0 {
            return Err(RiskError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                c.tolerance
            )));
        }
        self.snapshot_time()?;
        Ok(())
    }
}
