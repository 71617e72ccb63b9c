//! Account-level fraud-based target table
//!
//! Aggregates are rounded to four decimals before scoring. Quantiles use linear
//! interpolation and skip undefined values (the standard deviation of a
//! single-transaction account).

use crate::data::{Transaction, ACCOUNT_ID, AMOUNT, FRAUD_RESULT};
use crate::error::RiskError;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskCategory {
    LowRisk,
    MediumRisk,
    HighRisk,
    VeryHighRisk,
}

impl RiskCategory {
    /// Right-closed bins: (-inf, 10], (10, 30], (30, 50], (50, inf)
    pub fn from_score(score: f64) -> Self {
        if score <= 10.0 {
            Self::LowRisk
        } else if score <= 30.0 {
            Self::MediumRisk
        } else if score <= 50.0 {
            Self::HighRisk
        } else {
            Self::VeryHighRisk
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowRisk => "low_risk",
            Self::MediumRisk => "medium_risk",
            Self::HighRisk => "high_risk",
            Self::VeryHighRisk => "very_high_risk",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountTarget {
    pub account_id: String,
    pub fraud_count: f64,
    pub fraud_rate: f64,
    pub avg_value: f64,
    pub max_value: f64,
    pub avg_amount: f64,
    /// Sample standard deviation; NaN for single-transaction accounts
    pub amount_std: f64,
    pub risk_score: f64,
    pub risk_category: RiskCategory,
    pub default_risk: bool,
    pub risk_category_encoded: usize,
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Linear-interpolated quantile over the defined values
fn quantile(values: impl Iterator<Item = f64>, q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

fn above(value: f64, threshold: Option<f64>) -> bool {
    threshold.is_some_and(|t| value > t)
}

/// Build the per-account fraud target table
///
/// Requires `Amount` and `FraudResult` on every transaction.
pub fn create_target_variable(transactions: &[Transaction]) -> crate::Result<Vec<AccountTarget>> {
    struct Acc {
        frauds: Vec<f64>,
        values: Vec<f64>,
        amounts: Vec<f64>,
    }

    let mut by_account: BTreeMap<&str, Acc> = BTreeMap::new();
    for t in transactions {
        let amount = t.amount.ok_or_else(|| RiskError::MissingColumn(AMOUNT.to_string()))?;
        let fraud = t
            .fraud_result
            .ok_or_else(|| RiskError::MissingColumn(FRAUD_RESULT.to_string()))?;
        let acc = by_account.entry(t.account_id.as_str()).or_insert(Acc {
            frauds: Vec::new(),
            values: Vec::new(),
            amounts: Vec::new(),
        });
        acc.frauds.push(fraud as f64);
        acc.values.push(t.value);
        acc.amounts.push(amount);
    }

    let mut targets: Vec<AccountTarget> = by_account
        .into_iter()
        .map(|(account_id, acc)| {
            let n = acc.values.len() as f64;
            let fraud_count: f64 = acc.frauds.iter().sum();
            let avg_amount = acc.amounts.iter().sum::<f64>() / n;
            let amount_std = if acc.amounts.len() > 1 {
                let ss: f64 = acc.amounts.iter().map(|a| (a - avg_amount).powi(2)).sum();
                (ss / (n - 1.0)).sqrt()
            } else {
                f64::NAN
            };

            AccountTarget {
                account_id: account_id.to_string(),
                fraud_count: round4(fraud_count),
                fraud_rate: round4(fraud_count / n),
                avg_value: round4(acc.values.iter().sum::<f64>() / n),
                max_value: round4(acc.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                avg_amount: round4(avg_amount),
                amount_std: round4(amount_std),
                risk_score: 0.0,
                risk_category: RiskCategory::LowRisk,
                default_risk: false,
                risk_category_encoded: 0,
            }
        })
        .collect();

    let value_q90 = quantile(targets.iter().map(|t| t.avg_value), 0.9);
    let std_q90 = quantile(targets.iter().map(|t| t.amount_std), 0.9);
    let bonus = |hit: bool, points: f64| if hit { points } else { 0.0 };
    for t in &mut targets {
        t.risk_score = t.fraud_rate * 100.0
            + bonus(above(t.avg_value, value_q90), 20.0)
            + bonus(above(t.amount_std, std_q90), 10.0);
        t.risk_category = RiskCategory::from_score(t.risk_score);
    }

    let score_q80 = quantile(targets.iter().map(|t| t.risk_score), 0.8);
    // encoding follows the alphabetical order of the categories present
    let present: BTreeSet<&'static str> =
        targets.iter().map(|t| t.risk_category.as_str()).collect();
    let codes: BTreeMap<&str, usize> = present
        .into_iter()
        .enumerate()
        .map(|(i, c)| (c, i))
        .collect();
    for t in &mut targets {
        t.default_risk = t.fraud_rate > 0.0 || above(t.risk_score, score_q80);
        t.risk_category_encoded = codes[t.risk_category.as_str()];
    }

    Ok(targets)
}

/// Target rows as a DataFrame keyed by account id
pub fn targets_frame(targets: &[AccountTarget]) -> crate::Result<DataFrame> {
    let opt = |v: f64| if v.is_nan() { None } else { Some(v) };
    Ok(df!(
        ACCOUNT_ID => targets.iter().map(|t| t.account_id.as_str()).collect::<Vec<_>>(),
        "fraud_count" => targets.iter().map(|t| t.fraud_count).collect::<Vec<_>>(),
        "fraud_rate" => targets.iter().map(|t| t.fraud_rate).collect::<Vec<_>>(),
        "avg_value" => targets.iter().map(|t| t.avg_value).collect::<Vec<_>>(),
        "max_value" => targets.iter().map(|t| t.max_value).collect::<Vec<_>>(),
        "avg_amount" => targets.iter().map(|t| t.avg_amount).collect::<Vec<_>>(),
        "amount_std" => targets.iter().map(|t| opt(t.amount_std)).collect::<Vec<_>>(),
        "risk_score" => targets.iter().map(|t| t.risk_score).collect::<Vec<_>>(),
        "risk_category" => targets.iter().map(|t| t.risk_category.as_str()).collect::<Vec<_>>(),
        "default_risk" => targets.iter().map(|t| i32::from(t.default_risk)).collect::<Vec<_>>(),
        "risk_category_encoded" => targets
            .iter()
            .map(|t| t.risk_category_encoded as u32)
            .collect::<Vec<_>>()
    )?)
}
