//! riskforge: proxy credit-risk targets from RFM segmentation
//!
//! Customers without an observed default outcome get a binary `is_high_risk`
//! label: RFM metrics are computed from the transaction log, standardized and
//! clustered with K-Means, and the least engaged cluster is flagged. The label is
//! then propagated onto the account-level feature table for model training.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod identity;
pub mod model;
pub mod pipeline;
pub mod rfm;
pub mod risk;
pub mod target;

pub use cli::Args;
pub use config::{ClusteringConfig, PipelineConfig};
pub use data::{load_transactions, Transaction};
pub use error::RiskError;
pub use identity::{merge_high_risk, AccountCustomerMap, MergeOutcome};
pub use model::{fit_segments, KMeansModel, SegmentModel, Segmentation};
pub use pipeline::{build_proxy_target, run, PipelineReport, ProxyTarget, RunPaths};
pub use rfm::{calculate_rfm, RfmRecord, RfmTable};
pub use risk::{assign_high_risk, select_high_risk_cluster, ClusterProfile, RiskLabels};
pub use target::{create_target_variable, AccountTarget};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, RiskError>;
