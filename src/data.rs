//! Transaction log and table I/O using Polars

use crate::error::RiskError;
use crate::rfm::parse_timestamp;
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

pub const TRANSACTION_ID: &str = "TransactionId";
pub const ACCOUNT_ID: &str = "AccountId";
pub const CUSTOMER_ID: &str = "CustomerId";
pub const TIMESTAMP: &str = "TransactionStartTime";
pub const VALUE: &str = "Value";
pub const AMOUNT: &str = "Amount";
pub const FRAUD_RESULT: &str = "FraudResult";

/// A single row of the raw transaction log
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub account_id: String,
    pub customer_id: String,
    /// Monetary magnitude used for RFM
    pub value: f64,
    pub timestamp: NaiveDateTime,
    /// Signed amount, only needed for the fraud target table
    pub amount: Option<f64>,
    pub fraud_result: Option<i64>,
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<String>,
        account_id: impl Into<String>,
        customer_id: impl Into<String>,
        value: f64,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            account_id: account_id.into(),
            customer_id: customer_id.into(),
            value,
            timestamp,
            amount: None,
            fraud_result: None,
        }
    }

    pub fn with_fraud_fields(mut self, amount: f64, fraud_result: i64) -> Self {
        self.amount = Some(amount);
        self.fraud_result = Some(fraud_result);
        self
    }
}

/// Read a CSV file into a DataFrame
pub fn read_table<P: AsRef<Path>>(path: P) -> crate::Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Write a DataFrame as CSV with a header row
pub fn write_table<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> crate::Result<()> {
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Load the raw transaction log from a CSV file
///
/// Fails on the first timestamp that cannot be parsed; rows are never dropped.
pub fn load_transactions<P: AsRef<Path>>(path: P) -> crate::Result<Vec<Transaction>> {
    let df = read_table(path)?;
    transactions_from_frame(&df)
}

/// Convert a transaction DataFrame into typed records
pub fn transactions_from_frame(df: &DataFrame) -> crate::Result<Vec<Transaction>> {
    let transaction_ids = string_column(df, TRANSACTION_ID)?;
    let account_ids = string_column(df, ACCOUNT_ID)?;
    let customer_ids = string_column(df, CUSTOMER_ID)?;
    let timestamps = string_column(df, TIMESTAMP)?;
    let values = float_column(df, VALUE)?;

    let amounts = if has_column(df, AMOUNT) {
        Some(float_column(df, AMOUNT)?)
    } else {
        None
    };
    let fraud_results = if has_column(df, FRAUD_RESULT) {
        Some(int_column(df, FRAUD_RESULT)?)
    } else {
        None
    };

    let mut transactions = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let raw_time = required(&timestamps[row], TIMESTAMP, row)?;
        let timestamp = parse_timestamp(raw_time).ok_or_else(|| RiskError::InvalidTimestamp {
            row: row + 1,
            value: raw_time.to_string(),
        })?;

        transactions.push(Transaction {
            transaction_id: required(&transaction_ids[row], TRANSACTION_ID, row)?.to_string(),
            account_id: required(&account_ids[row], ACCOUNT_ID, row)?.to_string(),
            customer_id: required(&customer_ids[row], CUSTOMER_ID, row)?.to_string(),
            value: *required(&values[row], VALUE, row)?,
            timestamp,
            amount: amounts.as_ref().and_then(|a| a[row]),
            fraud_result: fraud_results.as_ref().and_then(|f| f[row]),
        });
    }

    Ok(transactions)
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| *c == name)
}

fn column<'a>(df: &'a DataFrame, name: &str) -> crate::Result<&'a Series> {
    df.column(name)
        .map_err(|_| RiskError::MissingColumn(name.to_string()))
}

fn string_column(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<String>>> {
    let series = column(df, name)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()))
        .collect();
    Ok(values)
}

fn float_column(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<f64>>> {
    let series = column(df, name)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

fn int_column(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<i64>>> {
    let series = column(df, name)?.cast(&DataType::Int64)?;
    let values = series.i64()?.into_iter().collect();
    Ok(values)
}

fn required<'a, T>(value: &'a Option<T>, column: &'static str, row: usize) -> crate::Result<&'a T> {
    value.as_ref().ok_or(RiskError::MissingField {
        column,
        row: row + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "TransactionId,AccountId,CustomerId,Amount,Value,TransactionStartTime,FraudResult"
        )
        .unwrap();
        writeln!(file, "T1,AC1,C1,1000.0,1000,2018-11-15T02:18:49Z,0").unwrap();
        writeln!(file, "T2,AC2,C2,-20.0,20,2018-11-15T02:19:08Z,0").unwrap();
        writeln!(file, "T3,AC1,C1,500.0,500,2018-11-16T10:00:00Z,1").unwrap();
        file
    }

    #[test]
    fn test_load_transactions() {
        let file = create_test_csv();
        let transactions = load_transactions(file.path()).unwrap();

        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0].transaction_id, "T1");
        assert_eq!(transactions[0].account_id, "AC1");
        assert_eq!(transactions[1].customer_id, "C2");
        assert_eq!(transactions[1].value, 20.0);
        assert_eq!(transactions[1].amount, Some(-20.0));
        assert_eq!(transactions[2].fraud_result, Some(1));
        assert_eq!(
            transactions[2].timestamp.to_string(),
            "2018-11-16 10:00:00"
        );
    }

    #[test]
    fn test_optional_fraud_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "TransactionId,AccountId,CustomerId,Value,TransactionStartTime").unwrap();
        writeln!(file, "1,A,C,10,2024-01-01").unwrap();

        let transactions = load_transactions(file.path()).unwrap();
        assert_eq!(transactions[0].transaction_id, "1");
        assert!(transactions[0].amount.is_none());
        assert!(transactions[0].fraud_result.is_none());
    }

    #[test]
    fn test_malformed_timestamp_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "TransactionId,AccountId,CustomerId,Value,TransactionStartTime").unwrap();
        writeln!(file, "1,A,C,10,2024-01-01").unwrap();
        writeln!(file, "2,A,C,10,not-a-date").unwrap();

        let err = load_transactions(file.path()).unwrap_err();
        match err {
            RiskError::InvalidTimestamp { row, value } => {
                assert_eq!(row, 2);
                assert_eq!(value, "not-a-date");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "TransactionId,AccountId,Value,TransactionStartTime").unwrap();
        writeln!(file, "1,A,10,2024-01-01").unwrap();

        let err = load_transactions(file.path()).unwrap_err();
        assert!(matches!(err, RiskError::MissingColumn(ref c) if c == CUSTOMER_ID));
    }

    #[test]
    fn test_write_and_read_table() {
        let mut df = df!(
            "AccountId" => ["A", "B"],
            "is_high_risk" => [1i32, 0]
        )
        .unwrap();
        let file = NamedTempFile::new().unwrap();

        write_table(&mut df, file.path()).unwrap();
        let back = read_table(file.path()).unwrap();
        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.get_column_names(), &["AccountId", "is_high_risk"]);
    }
}
