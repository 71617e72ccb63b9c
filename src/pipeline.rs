//! End-to-end proxy-target pipeline
//!
//! transactions -> RFM -> segments -> risk labels -> account-level merge.
//! Each stage takes the previous stage's output by reference and returns a new
//! value; nothing is mutated in place.

use crate::config::PipelineConfig;
use crate::data::{self, Transaction, CUSTOMER_ID};
use crate::identity::{merge_high_risk, AccountCustomerMap, HIGH_RISK_COLUMN};
use crate::model::{fit_segments, SegmentModel, Segmentation};
use crate::rfm::{calculate_rfm, RfmTable};
use crate::risk::{assign_high_risk, ClusterProfile, RiskLabels};
use crate::target::{create_target_variable, targets_frame};
use polars::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Every intermediate result of one proxy-target run
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub rfm: RfmTable,
    pub segmentation: Segmentation,
    pub labels: RiskLabels,
    pub accounts: AccountCustomerMap,
}

impl ProxyTarget {
    pub fn segment_model(&self) -> SegmentModel {
        SegmentModel::new(
            &self.segmentation,
            self.labels.high_risk_cluster,
            self.rfm.snapshot.to_string(),
        )
    }

    /// Customer-level table: RFM metrics, cluster and flag
    pub fn customer_frame(&self) -> crate::Result<DataFrame> {
        let records = &self.rfm.records;
        let clusters: Vec<u32> = self
            .segmentation
            .model
            .labels
            .iter()
            .map(|&c| c as u32)
            .collect();
        let flags: Vec<i32> = records
            .iter()
            .map(|r| i32::from(self.labels.is_high_risk(&r.customer_id).unwrap_or(false)))
            .collect();

        Ok(df!(
            CUSTOMER_ID => records.iter().map(|r| r.customer_id.as_str()).collect::<Vec<_>>(),
            "Recency" => records.iter().map(|r| r.recency).collect::<Vec<_>>(),
            "Frequency" => records.iter().map(|r| r.frequency as u64).collect::<Vec<_>>(),
            "Monetary" => records.iter().map(|r| r.monetary).collect::<Vec<_>>(),
            "cluster" => clusters,
            HIGH_RISK_COLUMN => flags
        )?)
    }
}

/// Compute RFM, clusters and proxy labels from the raw log
pub fn build_proxy_target(
    transactions: &[Transaction],
    config: &PipelineConfig,
) -> crate::Result<ProxyTarget> {
    config.validate()?;

    let rfm = calculate_rfm(transactions, config.snapshot_time()?)?;
    info!(
        "RFM computed for {} customers (snapshot {})",
        rfm.len(),
        rfm.snapshot
    );

    let segmentation = fit_segments(&rfm, &config.clustering)?;
    info!(
        "K-Means fitted: k={} seed={} inertia={:.4}",
        segmentation.model.n_clusters, config.clustering.seed, segmentation.model.inertia
    );

    let labels = assign_high_risk(&rfm, &segmentation.model.labels)?;
    for p in &labels.profiles {
        debug!(
            "Cluster {}: n={} R={:.2} F={:.2} M={:.2}",
            p.cluster, p.size, p.mean_recency, p.mean_frequency, p.mean_monetary
        );
    }
    info!(
        "High-risk cluster {} ({} of {} customers)",
        labels.high_risk_cluster,
        labels.high_risk_count(),
        labels.customers.len()
    );

    Ok(ProxyTarget {
        rfm,
        segmentation,
        labels,
        accounts: AccountCustomerMap::from_transactions(transactions),
    })
}

/// Input and output locations for one batch run
#[derive(Debug, Clone, Default)]
pub struct RunPaths {
    pub transactions: PathBuf,
    /// Account-level feature table to label
    pub features: Option<PathBuf>,
    /// Merged, labeled feature table
    pub output: Option<PathBuf>,
    /// Customer-level RFM/cluster/flag export
    pub labels_output: Option<PathBuf>,
    /// Fraud-based account target table
    pub targets_output: Option<PathBuf>,
    /// Fitted segmentation parameters (JSON)
    pub model_output: Option<PathBuf>,
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub customers: usize,
    pub high_risk_cluster: usize,
    pub high_risk_customers: usize,
    pub profiles: Vec<ClusterProfile>,
    pub inertia: f64,
    pub merged_rows: Option<usize>,
    pub defaulted_rows: Option<usize>,
    pub target_accounts: Option<usize>,
}

/// Run the full batch job: load, label, merge and persist
pub fn run(paths: &RunPaths, config: &PipelineConfig) -> crate::Result<PipelineReport> {
    let start = Instant::now();

    let transactions = data::load_transactions(&paths.transactions)?;
    info!(
        "Loaded {} transactions from {}",
        transactions.len(),
        paths.transactions.display()
    );

    let proxy = build_proxy_target(&transactions, config)?;

    let mut merged_rows = None;
    let mut defaulted_rows = None;
    if let Some(features_path) = &paths.features {
        let features = data::read_table(features_path)?;
        let mut outcome = merge_high_risk(features, &proxy.accounts, &proxy.labels)?;
        merged_rows = Some(outcome.frame.height());
        defaulted_rows = Some(outcome.defaulted_rows);
        if let Some(out) = &paths.output {
            data::write_table(&mut outcome.frame, out)?;
            info!("Labeled dataset written to {}", out.display());
        }
    }

    if let Some(out) = &paths.labels_output {
        data::write_table(&mut proxy.customer_frame()?, out)?;
        info!("Customer labels written to {}", out.display());
    }

    let mut target_accounts = None;
    if let Some(out) = &paths.targets_output {
        let targets = create_target_variable(&transactions)?;
        target_accounts = Some(targets.len());
        data::write_table(&mut targets_frame(&targets)?, out)?;
        info!("Fraud targets for {} accounts written to {}", targets.len(), out.display());
    }

    if let Some(out) = &paths.model_output {
        proxy.segment_model().save(out)?;
        info!("Segment model written to {}", out.display());
    }

    info!("Pipeline finished in {:.2}s", start.elapsed().as_secs_f64());

    Ok(PipelineReport {
        customers: proxy.rfm.len(),
        high_risk_cluster: proxy.labels.high_risk_cluster,
        high_risk_customers: proxy.labels.high_risk_count(),
        profiles: proxy.labels.profiles,
        inertia: proxy.segmentation.model.inertia,
        merged_rows,
        defaulted_rows,
        target_accounts,
    })
}
