//! Error types for the proxy-target pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Invalid timestamp '{value}' at row {row}")]
    InvalidTimestamp { row: usize, value: String },

    #[error("Invalid snapshot time '{0}'")]
    InvalidSnapshot(String),

    #[error("Negative value {value} at row {row} (customer {customer_id})")]
    NegativeValue {
        row: usize,
        customer_id: String,
        value: f64,
    },

    #[error("Missing value in column '{column}' at row {row}")]
    MissingField { column: &'static str, row: usize },

    #[error("Column '{0}' is required but not present")]
    MissingColumn(String),

    #[error("Snapshot {snapshot} precedes the latest transaction of customer {customer_id}")]
    SnapshotBeforeTransaction {
        customer_id: String,
        snapshot: String,
    },

    #[error("Transaction log is empty")]
    EmptyLog,

    #[error("Cannot form {clusters} clusters from {customers} distinct customers")]
    InsufficientCustomers { customers: usize, clusters: usize },

    #[error("Cluster {cluster} is empty after fitting (seed {seed}); change the seed or k")]
    EmptyCluster { cluster: usize, seed: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("Clustering error: {0}")]
    Clustering(#[from] linfa_clustering::KMeansError),

    #[error("Scaling error: {0}")]
    Scaling(#[from] linfa_preprocessing::PreprocessingError),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
