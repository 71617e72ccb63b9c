//! Recency/Frequency/Monetary computation from the raw transaction log

use crate::data::Transaction;
use crate::error::RiskError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Behavioral metrics for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct RfmRecord {
    pub customer_id: String,
    /// Whole days between the snapshot and the latest transaction
    pub recency: i64,
    /// Number of transactions
    pub frequency: usize,
    /// Sum of transaction values
    pub monetary: f64,
}

/// One RFM record per distinct customer, ordered by customer id
#[derive(Debug, Clone, PartialEq)]
pub struct RfmTable {
    pub snapshot: NaiveDateTime,
    pub records: Vec<RfmRecord>,
}

impl RfmTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, customer_id: &str) -> Option<&RfmRecord> {
        self.records
            .binary_search_by(|r| r.customer_id.as_str().cmp(customer_id))
            .ok()
            .map(|idx| &self.records[idx])
    }

    pub fn customer_ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.customer_id.as_str())
    }

    /// Raw metrics as an (n_customers, 3) matrix in R, F, M column order
    pub fn to_array(&self) -> crate::Result<Array2<f64>> {
        let mut raw = Vec::with_capacity(self.records.len() * 3);
        for r in &self.records {
            raw.extend_from_slice(&[r.recency as f64, r.frequency as f64, r.monetary]);
        }
        Ok(Array2::from_shape_vec((self.records.len(), 3), raw)?)
    }
}

/// Parse an ISO-8601 timestamp or date into a naive UTC datetime
///
/// Accepts RFC 3339 (offsets are normalized to UTC), `YYYY-MM-DDTHH:MM:SS[.f]`,
/// `YYYY-MM-DD HH:MM:SS[.f]` and plain `YYYY-MM-DD`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// One day after the latest transaction in the log
pub fn default_snapshot(transactions: &[Transaction]) -> Option<NaiveDateTime> {
    transactions
        .iter()
        .map(|t| t.timestamp)
        .max()
        .map(|latest| latest + Duration::days(1))
}

/// Compute one RFM record per distinct customer id
///
/// The result is independent of row order. Without an explicit snapshot the
/// reference time is [`default_snapshot`], so every recency is at least 1.
pub fn calculate_rfm(
    transactions: &[Transaction],
    snapshot: Option<NaiveDateTime>,
) -> crate::Result<RfmTable> {
    let snapshot = match snapshot.or_else(|| default_snapshot(transactions)) {
        Some(s) => s,
        None => return Err(RiskError::EmptyLog),
    };

    struct Acc {
        latest: NaiveDateTime,
        count: usize,
        total: f64,
    }

    let mut by_customer: BTreeMap<&str, Acc> = BTreeMap::new();
    for (row, t) in transactions.iter().enumerate() {
        if t.value < 0.0 || t.value.is_nan() {
            return Err(RiskError::NegativeValue {
                row: row + 1,
                customer_id: t.customer_id.clone(),
                value: t.value,
            });
        }
        by_customer
            .entry(t.customer_id.as_str())
            .and_modify(|acc| {
                acc.latest = acc.latest.max(t.timestamp);
                acc.count += 1;
                acc.total += t.value;
            })
            .or_insert(Acc {
                latest: t.timestamp,
                count: 1,
                total: t.value,
            });
    }

    let mut records = Vec::with_capacity(by_customer.len());
    for (customer_id, acc) in by_customer {
        if acc.latest > snapshot {
            return Err(RiskError::SnapshotBeforeTransaction {
                customer_id: customer_id.to_string(),
                snapshot: snapshot.to_string(),
            });
        }
        records.push(RfmRecord {
            customer_id: customer_id.to_string(),
            // num_days truncates partial days
            recency: (snapshot - acc.latest).num_days(),
            frequency: acc.count,
            monetary: acc.total,
        });
    }

    Ok(RfmTable { snapshot, records })
}
