//! High-risk cluster selection and per-customer proxy labels
//!
//! The risky cluster is chosen from the run's own cluster means, never by index:
//! lowest mean frequency first, then lowest mean monetary, then highest mean
//! recency. Clusters that tie on all three keys resolve to the lowest cluster id.

use crate::error::RiskError;
use crate::rfm::RfmTable;
use ndarray::Array1;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Mean RFM statistics of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub size: usize,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
}

/// Binary proxy target per customer
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLabels {
    pub high_risk_cluster: usize,
    pub profiles: Vec<ClusterProfile>,
    /// customer id -> (cluster, is_high_risk)
    pub customers: BTreeMap<String, (usize, bool)>,
}

impl RiskLabels {
    pub fn is_high_risk(&self, customer_id: &str) -> Option<bool> {
        self.customers.get(customer_id).map(|&(_, flag)| flag)
    }

    pub fn high_risk_count(&self) -> usize {
        self.customers.values().filter(|(_, flag)| *flag).count()
    }
}

/// Per-cluster means over the raw RFM metrics, ordered by cluster id
///
/// Clusters without members are omitted.
pub fn cluster_profiles(
    rfm: &RfmTable,
    labels: &Array1<usize>,
) -> crate::Result<Vec<ClusterProfile>> {
    if rfm.len() != labels.len() {
        return Err(RiskError::InvalidConfig(format!(
            "{} cluster labels for {} customers",
            labels.len(),
            rfm.len()
        )));
    }

    // cluster -> (count, sum r, sum f, sum m)
    let mut sums: BTreeMap<usize, (usize, f64, f64, f64)> = BTreeMap::new();
    for (record, &cluster) in rfm.records.iter().zip(labels.iter()) {
        let entry = sums.entry(cluster).or_insert((0, 0.0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += record.recency as f64;
        entry.2 += record.frequency as f64;
        entry.3 += record.monetary;
    }

    Ok(sums
        .into_iter()
        .map(|(cluster, (n, r, f, m))| {
            let n_f = n as f64;
            ClusterProfile {
                cluster,
                size: n,
                mean_recency: r / n_f,
                mean_frequency: f / n_f,
                mean_monetary: m / n_f,
            }
        })
        .collect())
}

fn risk_order(a: &ClusterProfile, b: &ClusterProfile) -> Ordering {
    a.mean_frequency
        .total_cmp(&b.mean_frequency)
        .then_with(|| a.mean_monetary.total_cmp(&b.mean_monetary))
        .then_with(|| b.mean_recency.total_cmp(&a.mean_recency))
}

/// The single cluster ranked first by the composite risk ordering
pub fn select_high_risk_cluster(profiles: &[ClusterProfile]) -> Option<usize> {
    let mut ranked: Vec<&ClusterProfile> = profiles.iter().collect();
    ranked.sort_by_key(|p| p.cluster);
    // stable: full ties keep ascending cluster id
    ranked.sort_by(|a, b| risk_order(a, b));
    ranked.first().map(|p| p.cluster)
}

/// Flag every customer of the selected cluster as high risk, all others not
pub fn assign_high_risk(rfm: &RfmTable, labels: &Array1<usize>) -> crate::Result<RiskLabels> {
    let profiles = cluster_profiles(rfm, labels)?;
    let high_risk_cluster = select_high_risk_cluster(&profiles).ok_or(RiskError::EmptyLog)?;

    let customers = rfm
        .records
        .iter()
        .zip(labels.iter())
        .map(|(record, &cluster)| {
            (
                record.customer_id.clone(),
                (cluster, cluster == high_risk_cluster),
            )
        })
        .collect();

    Ok(RiskLabels {
        high_risk_cluster,
        profiles,
        customers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rfm::RfmRecord;
    use chrono::NaiveDate;
    use ndarray::array;

    fn profile(cluster: usize, r: f64, f: f64, m: f64) -> ClusterProfile {
        ClusterProfile {
            cluster,
            size: 1,
            mean_recency: r,
            mean_frequency: f,
            mean_monetary: m,
        }
    }

    fn table(rows: &[(&str, i64, usize, f64)]) -> RfmTable {
        RfmTable {
            snapshot: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            records: rows
                .iter()
                .map(|&(id, r, f, m)| RfmRecord {
                    customer_id: id.to_string(),
                    recency: r,
                    frequency: f,
                    monetary: m,
                })
                .collect(),
        }
    }

    #[test]
    fn test_lowest_frequency_wins() {
        let profiles = vec![
            profile(0, 10.0, 5.0, 100.0),
            profile(1, 1.0, 1.0, 900.0),
            profile(2, 90.0, 3.0, 10.0),
        ];
        assert_eq!(select_high_risk_cluster(&profiles), Some(1));
    }

    #[test]
    fn test_monetary_breaks_frequency_tie() {
        let profiles = vec![
            profile(0, 10.0, 2.0, 100.0),
            profile(1, 90.0, 2.0, 50.0),
            profile(2, 5.0, 8.0, 10.0),
        ];
        assert_eq!(select_high_risk_cluster(&profiles), Some(1));
    }

    #[test]
    fn test_longer_recency_breaks_remaining_tie() {
        let profiles = vec![
            profile(0, 10.0, 2.0, 50.0),
            profile(1, 40.0, 2.0, 50.0),
            profile(2, 20.0, 2.0, 50.0),
        ];
        assert_eq!(select_high_risk_cluster(&profiles), Some(1));
    }

    #[test]
    fn test_full_tie_takes_lowest_cluster_id() {
        let profiles = vec![
            profile(2, 30.0, 2.0, 50.0),
            profile(1, 30.0, 2.0, 50.0),
            profile(0, 1.0, 9.0, 500.0),
        ];
        assert_eq!(select_high_risk_cluster(&profiles), Some(1));
        assert_eq!(select_high_risk_cluster(&[]), None);
    }

    #[test]
    fn test_cluster_profiles_means() {
        let rfm = table(&[
            ("a", 10, 1, 100.0),
            ("b", 20, 3, 300.0),
            ("c", 5, 10, 1000.0),
        ]);
        let profiles = cluster_profiles(&rfm, &array![1, 1, 0]).unwrap();

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0], profile(0, 5.0, 10.0, 1000.0));
        assert_eq!(profiles[1].cluster, 1);
        assert_eq!(profiles[1].size, 2);
        assert_eq!(profiles[1].mean_recency, 15.0);
        assert_eq!(profiles[1].mean_frequency, 2.0);
        assert_eq!(profiles[1].mean_monetary, 200.0);

        assert!(cluster_profiles(&rfm, &array![0, 1]).is_err());
    }

    #[test]
    fn test_assign_high_risk_partitions_customers() {
        let rfm = table(&[
            ("a", 200, 1, 10.0),
            ("b", 180, 1, 15.0),
            ("c", 20, 6, 400.0),
            ("d", 25, 5, 350.0),
            ("e", 1, 30, 9000.0),
        ]);
        let labels = array![2, 2, 0, 0, 1];
        let risk = assign_high_risk(&rfm, &labels).unwrap();

        assert_eq!(risk.high_risk_cluster, 2);
        assert_eq!(risk.customers.len(), 5);
        assert_eq!(risk.high_risk_count(), 2);
        assert_eq!(risk.is_high_risk("a"), Some(true));
        assert_eq!(risk.is_high_risk("b"), Some(true));
        assert_eq!(risk.is_high_risk("c"), Some(false));
        assert_eq!(risk.is_high_risk("e"), Some(false));
        assert_eq!(risk.is_high_risk("zz"), None);

        // every flagged customer sits in the selected cluster and nowhere else
        for (cluster, flag) in risk.customers.values() {
            assert_eq!(*flag, *cluster == risk.high_risk_cluster);
        }
    }

    #[test]
    fn test_assignment_is_idempotent() {
        let rfm = table(&[("a", 3, 1, 1.0), ("b", 3, 1, 1.0), ("c", 1, 4, 9.0)]);
        let labels = array![0, 1, 2];
        let first = assign_high_risk(&rfm, &labels).unwrap();
        let second = assign_high_risk(&rfm, &labels).unwrap();
        assert_eq!(first, second);
        // clusters 0 and 1 tie on every key
        assert_eq!(first.high_risk_cluster, 0);
    }
}
