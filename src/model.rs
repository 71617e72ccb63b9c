//! Behavioral segmentation: RFM standardization and K-Means clustering

use crate::config::ClusteringConfig;
use crate::error::RiskError;
use crate::rfm::RfmTable;
use linfa::traits::{Fit, Predict, Transformer};
use linfa::{Dataset, DatasetBase};
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

/// Fit a standard scaler (zero mean, unit population variance) on raw RFM rows
///
/// Columns with zero variance keep a unit scale.
pub fn fit_scaler(raw: &Array2<f64>) -> crate::Result<LinearScaler<f64>> {
    let dataset = Dataset::new(raw.clone(), Array1::<f64>::zeros(raw.nrows()));
    Ok(LinearScaler::standard().fit(&dataset)?)
}

/// Scale one raw `[recency, frequency, monetary]` point with a fitted scaler
pub fn scale_point(scaler: &LinearScaler<f64>, rfm: &[f64; 3]) -> crate::Result<Array1<f64>> {
    let input = Array2::from_shape_vec((1, 3), rfm.to_vec())?;
    let scaled = scaler.transform(input);
    Ok(scaled.row(0).to_owned())
}

/// Fitted K-Means result over standardized RFM features
#[derive(Debug, Clone)]
pub struct KMeansModel {
    pub n_clusters: usize,
    /// Cluster assignment per input row
    pub labels: Array1<usize>,
    /// Centroids in standardized space, shape (n_clusters, 3)
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl KMeansModel {
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Customers of one run partitioned into behavioral clusters
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Customer ids in the row order of `model.labels`
    pub customer_ids: Vec<String>,
    pub scaler: LinearScaler<f64>,
    pub model: KMeansModel,
    pub seed: u64,
}

/// Standardize RFM metrics and partition customers into `n_clusters` clusters
///
/// Fails when there are fewer customers than clusters, or when any cluster ends
/// up empty; k is never reduced.
pub fn fit_segments(rfm: &RfmTable, config: &ClusteringConfig) -> crate::Result<Segmentation> {
    if rfm.len() < config.n_clusters {
        return Err(RiskError::InsufficientCustomers {
            customers: rfm.len(),
            clusters: config.n_clusters,
        });
    }

    let raw = rfm.to_array()?;
    let scaler = fit_scaler(&raw)?;
    let features = scaler.transform(raw);
    debug!(
        "Scaler fitted: offsets={} scales={}",
        scaler.offsets(),
        scaler.scales()
    );

    let model = fit_kmeans(&features, config)?;

    Ok(Segmentation {
        customer_ids: rfm.customer_ids().map(str::to_string).collect(),
        scaler,
        model,
        seed: config.seed,
    })
}

/// Fit K-Means with a seeded RNG and `n_init` restarts
pub fn fit_kmeans(
    features: &Array2<f64>,
    config: &ClusteringConfig,
) -> crate::Result<KMeansModel> {
    let n_samples = features.nrows();
    if n_samples < config.n_clusters {
        return Err(RiskError::InsufficientCustomers {
            customers: n_samples,
            clusters: config.n_clusters,
        });
    }

    let dataset = DatasetBase::from(features.clone());
    let rng = Xoshiro256Plus::seed_from_u64(config.seed);

    let fitted = KMeans::params_with(config.n_clusters, rng, L2Dist)
        .n_runs(config.n_init)
        .max_n_iterations(config.max_iters)
        .tolerance(config.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = fitted.predict(features);
    let centroids = fitted.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    let model = KMeansModel {
        n_clusters: config.n_clusters,
        labels,
        centroids,
        inertia,
    };
    ensure_non_empty(&model.cluster_sizes(), config.seed)?;

    Ok(model)
}

fn ensure_non_empty(sizes: &[usize], seed: u64) -> crate::Result<()> {
    match sizes.iter().position(|&s| s == 0) {
        Some(cluster) => Err(RiskError::EmptyCluster { cluster, seed }),
        None => Ok(()),
    }
}

fn nearest_centroid(centroids: &Array2<f64>, point: &ArrayView1<f64>) -> usize {
    let mut min_distance = f64::INFINITY;
    let mut closest = 0;
    for (idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(point, &centroid);
        if distance < min_distance {
            min_distance = distance;
            closest = idx;
        }
    }
    closest
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Within-cluster sum of squares
fn compute_inertia(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| squared_distance(&features.row(i), &centroids.row(cluster)))
        .sum()
}

/// Fitted segmentation parameters persisted for reuse at inference time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentModel {
    pub n_clusters: usize,
    pub seed: u64,
    pub snapshot: String,
    pub scaler: LinearScaler<f64>,
    /// Standardized centroids, one `[recency, frequency, monetary]` row per cluster
    pub centroids: Vec<[f64; 3]>,
    pub high_risk_cluster: usize,
}

impl PartialEq for SegmentModel {
    fn eq(&self, other: &Self) -> bool {
        self.n_clusters == other.n_clusters
            && self.seed == other.seed
            && self.snapshot == other.snapshot
            && self.scaler.offsets() == other.scaler.offsets()
            && self.scaler.scales() == other.scaler.scales()
            && self.centroids == other.centroids
            && self.high_risk_cluster == other.high_risk_cluster
    }
}

impl SegmentModel {
    pub fn new(segmentation: &Segmentation, high_risk_cluster: usize, snapshot: String) -> Self {
        let centroids = segmentation
            .model
            .centroids
            .outer_iter()
            .map(|row| [row[0], row[1], row[2]])
            .collect();

        Self {
            n_clusters: segmentation.model.n_clusters,
            seed: segmentation.seed,
            snapshot,
            scaler: segmentation.scaler.clone(),
            centroids,
            high_risk_cluster,
        }
    }

    /// Assign raw (recency, frequency, monetary) values to a cluster
    ///
    /// Returns the cluster id and whether it is the high-risk cluster.
    pub fn classify(&self, rfm: [f64; 3]) -> crate::Result<(usize, bool)> {
        let flat: Vec<f64> = self.centroids.iter().flatten().copied().collect();
        let centroids = Array2::from_shape_vec((self.centroids.len(), 3), flat)?;
        let scaled = scale_point(&self.scaler, &rfm)?;
        let cluster = nearest_centroid(&centroids, &scaled.view());
        Ok((cluster, cluster == self.high_risk_cluster))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
