//! Command-line interface definitions and argument parsing

use crate::config::PipelineConfig;
use crate::pipeline::RunPaths;
use clap::Parser;
use std::path::PathBuf;

/// Build proxy credit-risk labels from a transaction log via RFM clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the raw transaction log CSV
    #[arg(short, long, default_value = "data.csv")]
    pub transactions: PathBuf,

    /// Account-level feature table CSV to label
    #[arg(short, long)]
    pub features: Option<PathBuf>,

    /// Output path for the labeled feature table
    #[arg(short, long, default_value = "model_data_with_proxy.csv")]
    pub output: PathBuf,

    /// Also write customer-level RFM, cluster and flag to this CSV
    #[arg(long)]
    pub labels_output: Option<PathBuf>,

    /// Also write the fraud-based account target table to this CSV
    #[arg(long)]
    pub targets_output: Option<PathBuf>,

    /// Segment model JSON: written after a run, read in prediction mode
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Prediction mode: classify "recency,frequency,monetary" with a saved model
    /// Example: --predict "30,10,500.0"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Snapshot time for recency (defaults to one day after the latest transaction)
    #[arg(long)]
    pub snapshot: Option<String>,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Seed for centroid initialization
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of K-Means restarts
    #[arg(long)]
    pub n_init: Option<usize>,

    /// Maximum iterations for K-Means algorithm
    #[arg(long)]
    pub max_iters: Option<u64>,

    /// Tolerance for K-Means convergence
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse RFM values from the predict string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> anyhow::Result<Option<[f64; 3]>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 3 {
            anyhow::bail!("Predict values must be in format 'recency,frequency,monetary'");
        }

        let mut values = [0.0; 3];
        for (slot, (name, raw)) in values
            .iter_mut()
            .zip(["recency", "frequency", "monetary"].iter().zip(parts.iter()))
        {
            *slot = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, raw))?;
        }

        Ok(Some(values))
    }

    /// Apply command-line overrides on top of a base configuration
    pub fn apply_overrides(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(snapshot) = &self.snapshot {
            config.snapshot = Some(snapshot.clone());
        }
        let clustering = &mut config.clustering;
        if let Some(k) = self.clusters {
            clustering.n_clusters = k;
        }
        if let Some(seed) = self.seed {
            clustering.seed = seed;
        }
        if let Some(n_init) = self.n_init {
            clustering.n_init = n_init;
        }
        if let Some(max_iters) = self.max_iters {
            clustering.max_iters = max_iters;
        }
        if let Some(tolerance) = self.tolerance {
            clustering.tolerance = tolerance;
        }
        config
    }

    pub fn run_paths(&self) -> RunPaths {
        RunPaths {
            transactions: self.transactions.clone(),
            features: self.features.clone(),
            output: self.features.as_ref().map(|_| self.output.clone()),
            labels_output: self.labels_output.clone(),
            targets_output: self.targets_output.clone(),
            model_output: self.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["riskforge"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_parse_rfm_values() {
        let mut args = args(&["--predict", "30,10,500.0"]);
        assert_eq!(args.parse_rfm_values().unwrap(), Some([30.0, 10.0, 500.0]));

        args.predict = None;
        assert_eq!(args.parse_rfm_values().unwrap(), None);

        args.predict = Some("invalid".to_string());
        assert!(args.parse_rfm_values().is_err());

        args.predict = Some("1,x,3".to_string());
        assert!(args.parse_rfm_values().is_err());
    }

    #[test]
    fn test_overrides() {
        let args = args(&["-k", "4", "--seed", "9", "--snapshot", "2024-02-01"]);
        let config = args.apply_overrides(PipelineConfig::default());
        assert_eq!(config.clustering.n_clusters, 4);
        assert_eq!(config.clustering.seed, 9);
        assert_eq!(config.clustering.n_init, 10);
        assert_eq!(config.snapshot.as_deref(), Some("2024-02-01"));
    }

    #[test]
    fn test_output_only_with_features() {
        let paths = args(&[]).run_paths();
        assert!(paths.output.is_none());

        let paths = args(&["--features", "f.csv", "-o", "out.csv"]).run_paths();
        assert_eq!(paths.output, Some(PathBuf::from("out.csv")));
    }
}
