//! Account-to-customer resolution and label propagation onto account-level rows

use crate::data::{Transaction, ACCOUNT_ID, CUSTOMER_ID};
use crate::risk::RiskLabels;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

pub const HIGH_RISK_COLUMN: &str = "is_high_risk";

/// Deduplicated (account id, customer id) relation from the raw log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountCustomerMap {
    pairs: BTreeSet<(String, String)>,
}

impl AccountCustomerMap {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let pairs = transactions
            .iter()
            .map(|t| (t.account_id.clone(), t.customer_id.clone()))
            .collect();
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Accounts linked to more than one customer id
    pub fn ambiguous_accounts(&self) -> Vec<&str> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (account, _) in &self.pairs {
            *counts.entry(account.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|&(_, n)| n > 1)
            .map(|(account, _)| account)
            .collect()
    }

    pub fn to_frame(&self) -> crate::Result<DataFrame> {
        let (accounts, customers): (Vec<&str>, Vec<&str>) = self
            .pairs
            .iter()
            .map(|(a, c)| (a.as_str(), c.as_str()))
            .unzip();
        Ok(df!(ACCOUNT_ID => accounts, CUSTOMER_ID => customers)?)
    }
}

/// Customer-level labels as a (CustomerId, is_high_risk) frame
pub fn labels_frame(labels: &RiskLabels) -> crate::Result<DataFrame> {
    let (customers, flags): (Vec<&str>, Vec<i32>) = labels
        .customers
        .iter()
        .map(|(customer, &(_, flag))| (customer.as_str(), i32::from(flag)))
        .unzip();
    Ok(df!(CUSTOMER_ID => customers, HIGH_RISK_COLUMN => flags)?)
}

/// Merged account-level table and how many rows fell back to the default label
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub frame: DataFrame,
    pub defaulted_rows: usize,
}

/// Left-join the feature table onto the account map and then the risk labels
///
/// Every feature row is kept. Rows whose account has no customer, or whose
/// customer has no label, get `is_high_risk = 0`. The customer id used for the
/// join is not part of the output.
pub fn merge_high_risk(
    features: DataFrame,
    map: &AccountCustomerMap,
    labels: &RiskLabels,
) -> crate::Result<MergeOutcome> {
    let ambiguous = map.ambiguous_accounts();
    if !ambiguous.is_empty() {
        warn!(
            "{} accounts map to more than one customer; their rows repeat per customer",
            ambiguous.len()
        );
    }

    let mut features = features;
    for stale in [CUSTOMER_ID, HIGH_RISK_COLUMN] {
        if features.get_column_names().iter().any(|c| *c == stale) {
            warn!("Feature table already has a '{}' column; replacing it", stale);
            features = features.drop(stale)?;
        }
    }

    let joined = features
        .lazy()
        .with_column(col(ACCOUNT_ID).cast(DataType::String))
        .join(
            map.to_frame()?.lazy(),
            [col(ACCOUNT_ID)],
            [col(ACCOUNT_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .join(
            labels_frame(labels)?.lazy(),
            [col(CUSTOMER_ID)],
            [col(CUSTOMER_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;

    let defaulted_rows = joined.column(HIGH_RISK_COLUMN)?.null_count();
    if defaulted_rows > 0 {
        warn!(
            "{} of {} account rows had no resolvable customer label; defaulted to 0",
            defaulted_rows,
            joined.height()
        );
    }

    let frame = joined
        .lazy()
        .with_column(col(HIGH_RISK_COLUMN).fill_null(lit(0)).cast(DataType::Int32))
        .collect()?
        .drop(CUSTOMER_ID)?;

    info!(
        "Merged {} account rows ({} high risk)",
        frame.height(),
        high_risk_rows(&frame)?
    );

    Ok(MergeOutcome {
        frame,
        defaulted_rows,
    })
}

fn high_risk_rows(frame: &DataFrame) -> crate::Result<usize> {
    let flags = frame.column(HIGH_RISK_COLUMN)?.i32()?;
    Ok(flags.into_iter().filter(|v| *v == Some(1)).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLabels;
    use crate::rfm::parse_timestamp;

    fn tx(id: &str, account: &str, customer: &str) -> Transaction {
        Transaction::new(id, account, customer, 1.0, parse_timestamp("2024-01-01").unwrap())
    }

    fn flags_by_account(frame: &DataFrame) -> BTreeMap<String, i32> {
        let accounts = frame.column("AccountId").unwrap().str().unwrap();
        let flags = frame.column("is_high_risk").unwrap().i32().unwrap();
        accounts
            .into_iter()
            .zip(flags)
            .map(|(a, f)| (a.unwrap().to_string(), f.unwrap()))
            .collect()
    }

    fn labels() -> RiskLabels {
        let mut customers = BTreeMap::new();
        customers.insert("C1".to_string(), (0, true));
        customers.insert("C2".to_string(), (1, false));
        RiskLabels {
            high_risk_cluster: 0,
            profiles: Vec::new(),
            customers,
        }
    }

    #[test]
    fn test_map_deduplicates_pairs() {
        let map = AccountCustomerMap::from_transactions(&[
            tx("1", "A1", "C1"),
            tx("2", "A1", "C1"),
            tx("3", "A2", "C2"),
        ]);
        assert_eq!(map.len(), 2);
        assert!(map.ambiguous_accounts().is_empty());

        let frame = map.to_frame().unwrap();
        assert_eq!(frame.shape(), (2, 2));
        let customers: Vec<Option<&str>> =
            frame.column("CustomerId").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(customers, vec![Some("C1"), Some("C2")]);
    }

    #[test]
    fn test_ambiguous_accounts() {
        let map = AccountCustomerMap::from_transactions(&[
            tx("1", "A1", "C1"),
            tx("2", "A1", "C2"),
            tx("3", "A2", "C2"),
        ]);
        assert_eq!(map.ambiguous_accounts(), vec!["A1"]);
    }

    #[test]
    fn test_merge_labels_and_defaults_unmapped_accounts() {
        let map =
            AccountCustomerMap::from_transactions(&[tx("1", "A1", "C1"), tx("2", "A2", "C2")]);
        let features = df!(
            "AccountId" => ["A1", "A2", "A3"],
            "total_amount" => [10.0, 20.0, 30.0]
        )
        .unwrap();

        let outcome = merge_high_risk(features, &map, &labels()).unwrap();
        let frame = outcome.frame;

        assert_eq!(outcome.defaulted_rows, 1);
        assert_eq!(frame.height(), 3);
        assert_eq!(
            frame.get_column_names(),
            &["AccountId", "total_amount", "is_high_risk"]
        );

        let flags = flags_by_account(&frame);
        assert_eq!(flags["A1"], 1);
        assert_eq!(flags["A2"], 0);
        assert_eq!(flags["A3"], 0);
    }

    #[test]
    fn test_merge_defaults_mapped_customer_without_label() {
        // A9 resolves to C9, which the label set does not contain
        let map =
            AccountCustomerMap::from_transactions(&[tx("1", "A1", "C1"), tx("2", "A9", "C9")]);
        let features = df!(
            "AccountId" => ["A1", "A9"],
            "total_amount" => [10.0, 90.0]
        )
        .unwrap();

        let outcome = merge_high_risk(features, &map, &labels()).unwrap();
        assert_eq!(outcome.defaulted_rows, 1);
        assert_eq!(outcome.frame.height(), 2);
        assert_eq!(
            outcome.frame.get_column_names(),
            &["AccountId", "total_amount", "is_high_risk"]
        );

        let flags = flags_by_account(&outcome.frame);
        assert_eq!(flags["A1"], 1);
        assert_eq!(flags["A9"], 0);
    }

    #[test]
    fn test_merge_replaces_existing_label_columns() {
        let map = AccountCustomerMap::from_transactions(&[tx("1", "A1", "C1")]);
        let features = df!(
            "AccountId" => ["A1"],
            "CustomerId" => ["stale"],
            "is_high_risk" => [0i32]
        )
        .unwrap();

        let outcome = merge_high_risk(features, &map, &labels()).unwrap();
        assert_eq!(outcome.defaulted_rows, 0);
        assert_eq!(outcome.frame.get_column_names(), &["AccountId", "is_high_risk"]);
        assert_eq!(high_risk_rows(&outcome.frame).unwrap(), 1);
    }

    #[test]
    fn test_numeric_account_ids_join() {
        let map = AccountCustomerMap::from_transactions(&[tx("1", "7", "C1")]);
        let features = df!("AccountId" => [7i64, 8], "f" => [1.0, 2.0]).unwrap();

        let outcome = merge_high_risk(features, &map, &labels()).unwrap();
        assert_eq!(outcome.frame.height(), 2);
        assert_eq!(outcome.defaulted_rows, 1);
        assert_eq!(high_risk_rows(&outcome.frame).unwrap(), 1);
    }
}
