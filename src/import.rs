//! Normalized transaction import from CSV.
//!
//! Expected header: `kind,timestamp,quantity,price[,id]`. `kind` is buy, sell or
//! transfer. Timestamps may be RFC 3339, a bare `YYYY-MM-DD` (midnight UTC), or
//! epoch milliseconds.

use crate::domain::{Decimal, TimeMs};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Sell,
    /// Move between the user's own wallets; no basis effect.
    Transfer,
}

/// One parsed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTransaction {
    /// 1-based data line number (header excluded).
    pub line: usize,
    pub kind: TransactionKind,
    pub timestamp: TimeMs,
    pub quantity: Decimal,
    /// Cost per unit for buys, proceeds per unit for sells.
    pub price: Decimal,
    pub external_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("csv error: {0}")]
    Csv(String),
    #[error("line {line}: {message}")]
    Row { line: usize, message: String },
}

pub fn parse_timestamp(raw: &str) -> Option<TimeMs> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(TimeMs::new(dt.timestamp_millis()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| TimeMs::new(naive.and_utc().timestamp_millis()));
    }
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .ok()
            .map(TimeMs::new)
            .filter(|time| time.to_datetime().is_some());
    }
    None
}

fn parse_kind(raw: &str) -> Option<TransactionKind> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "buy" | "receive" => Some(TransactionKind::Buy),
        "sell" | "spend" => Some(TransactionKind::Sell),
        "transfer" | "transfer_in" | "transfer_out" => Some(TransactionKind::Transfer),
        _ => None,
    }
}

pub fn parse_transactions_csv(csv_bytes: &[u8]) -> Result<Vec<ImportedTransaction>, ImportError> {
    #[derive(Debug, Deserialize)]
    struct Row {
        kind: String,
        timestamp: String,
        quantity: String,
        price: String,
        #[serde(default)]
        id: Option<String>,
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv_bytes);
    reader
        .headers()
        .map_err(|e| ImportError::Csv(e.to_string()))?;

    let mut transactions = Vec::new();
    for (idx, record) in reader.deserialize::<Row>().enumerate() {
        let line = idx + 1;
        let row_err = |message: String| ImportError::Row { line, message };

        let row = record.map_err(|e| row_err(format!("malformed row: {}", e)))?;
        let kind = parse_kind(&row.kind)
            .ok_or_else(|| row_err(format!("unknown kind: {}", row.kind)))?;
        let timestamp = parse_timestamp(&row.timestamp)
            .ok_or_else(|| row_err(format!("invalid timestamp: {}", row.timestamp)))?;
        let quantity = Decimal::from_str_canonical(&row.quantity)
            .map_err(|e| row_err(format!("invalid quantity: {}", e)))?;
        let price = Decimal::from_str_canonical(&row.price)
            .map_err(|e| row_err(format!("invalid price: {}", e)))?;

        transactions.push(ImportedTransaction {
            line,
            kind,
            timestamp,
            quantity,
            price,
            external_id: row.id.filter(|s| !s.is_empty()),
        });
    }

    Ok(transactions)
}

/// Chronological replay order: time, then buys before sells at the same
/// instant, then file order.
pub fn sort_for_replay(transactions: &mut [ImportedTransaction]) {
    fn kind_rank(kind: TransactionKind) -> u8 {
        match kind {
            TransactionKind::Buy => 0,
            TransactionKind::Transfer => 1,
            TransactionKind::Sell => 2,
        }
    }
    transactions.sort_by_key(|tx| (tx.timestamp, kind_rank(tx.kind), tx.line));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_rows() {
        let csv = b"kind,timestamp,quantity,price,id\n\
            buy,2022-01-01,10,10000,coinbase-1\n\
            sell,2024-01-02T12:00:00Z,12,50000,\n\
            transfer,1700000000000,1,0\n";
        let txs = parse_transactions_csv(csv).unwrap();
        assert_eq!(txs.len(), 3);

        assert_eq!(txs[0].kind, TransactionKind::Buy);
        assert_eq!(txs[0].timestamp, TimeMs::from_ymd(2022, 1, 1).unwrap());
        assert_eq!(txs[0].quantity.to_canonical_string(), "10");
        assert_eq!(txs[0].external_id.as_deref(), Some("coinbase-1"));

        assert_eq!(txs[1].kind, TransactionKind::Sell);
        assert_eq!(txs[1].line, 2);
        assert_eq!(txs[1].external_id, None);

        assert_eq!(txs[2].kind, TransactionKind::Transfer);
        assert_eq!(txs[2].timestamp, TimeMs::new(1_700_000_000_000));
    }

    #[test]
    fn test_parse_without_id_column() {
        let csv = b"kind,timestamp,quantity,price\nBUY, 2023-06-01 , 0.5 ,30000\n";
        let txs = parse_transactions_csv(csv).unwrap();
        assert_eq!(txs[0].kind, TransactionKind::Buy);
        assert_eq!(txs[0].quantity.to_canonical_string(), "0.5");
    }

    #[test]
    fn test_bad_rows_report_line() {
        let csv = b"kind,timestamp,quantity,price\nbuy,2023-06-01,1,1\nswap,2023-06-01,1,1\n";
        match parse_transactions_csv(csv) {
            Err(ImportError::Row { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("swap"));
            }
            other => panic!("expected row error, got {:?}", other),
        }

        let csv = b"kind,timestamp,quantity,price\nbuy,yesterday,1,1\n";
        assert!(matches!(
            parse_transactions_csv(csv),
            Err(ImportError::Row { line: 1, .. })
        ));

        let csv = b"kind,timestamp,quantity,price\nbuy,9223372036854775807,1,1\n";
        assert!(matches!(
            parse_transactions_csv(csv),
            Err(ImportError::Row { line: 1, .. })
        ));
    }

    #[test]
    fn test_short_row_reports_line() {
        let csv = b"kind,timestamp,quantity,price\n\
            buy,2023-06-01,1,1\n\
            buy,2023-06-02,1,1\n\
            buy,2023-06-03\n";
        match parse_transactions_csv(csv) {
            Err(ImportError::Row { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.starts_with("malformed row"));
            }
            other => panic!("expected row error, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_order_buys_before_sells() {
        let csv = b"kind,timestamp,quantity,price\n\
            sell,2024-01-01,1,100\n\
            buy,2024-01-01,1,50\n\
            buy,2023-01-01,1,40\n";
        let mut txs = parse_transactions_csv(csv).unwrap();
        sort_for_replay(&mut txs);
        let lines: Vec<usize> = txs.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![3, 2, 1]);
    }
}
