//! riskforge: proxy credit-risk labeling CLI
//!
//! Runs the batch pipeline (RFM, clustering, labeling, merge) or, with
//! `--predict`, classifies a single RFM point against a saved segment model.

use anyhow::{Context, Result};
use clap::Parser;
use riskforge::{pipeline, Args, PipelineConfig, SegmentModel};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        "riskforge=debug"
    } else {
        "riskforge=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    if let Some(rfm_values) = args.parse_rfm_values()? {
        run_prediction_mode(&args, rfm_values)
    } else {
        run_full_pipeline(&args)
    }
}

/// Classify one customer with a previously saved segment model
fn run_prediction_mode(args: &Args, rfm_values: [f64; 3]) -> Result<()> {
    let path = args
        .model
        .as_ref()
        .context("--predict requires --model pointing at a saved segment model")?;
    let model = SegmentModel::load(path)
        .with_context(|| format!("Failed to load segment model from {}", path.display()))?;

    let (cluster, high_risk) = model.classify(rfm_values)?;
    info!(
        "Input RFM values: R={}, F={}, M={}",
        rfm_values[0], rfm_values[1], rfm_values[2]
    );
    info!(
        "Predicted cluster {} (high-risk cluster is {}): is_high_risk={}",
        cluster,
        model.high_risk_cluster,
        u8::from(high_risk)
    );
    Ok(())
}

/// Run the full labeling pipeline
fn run_full_pipeline(args: &Args) -> Result<()> {
    let base = match &args.config {
        Some(path) => PipelineConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let config = args.apply_overrides(base);
    config.validate().context("Invalid pipeline configuration")?;

    let report = pipeline::run(&args.run_paths(), &config).context("Pipeline run failed")?;

    info!("=== Cluster Statistics ===");
    for p in &report.profiles {
        let share = p.size as f64 / report.customers as f64 * 100.0;
        let marker = if p.cluster == report.high_risk_cluster {
            " [high risk]"
        } else {
            ""
        };
        info!(
            "Cluster {}: {} customers ({:.1}%) R={:.1} F={:.2} M={:.2}{}",
            p.cluster,
            p.size,
            share,
            p.mean_recency,
            p.mean_frequency,
            p.mean_monetary,
            marker
        );
    }
    info!("Within-cluster sum of squares: {:.2}", report.inertia);
    if let (Some(rows), Some(defaulted)) = (report.merged_rows, report.defaulted_rows) {
        info!("Merged rows: {} ({} defaulted to not high risk)", rows, defaulted);
    }

    Ok(())
}
