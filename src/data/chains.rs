//! Option-chain loader.
//!
//! Reads tabular contract records from a CSV export and groups consecutive
//! rows sharing (valuation date, underlying) into ordered chains. The
//! expected schema is one row per listed contract:
//! `data_date, strike, symbol, ticker, strike_date, option_type, broker_price`.
//!
//! Exports sometimes carry a byte-order mark that corrupts the first header
//! cell; the loader normalizes that cell back to `data_date` before reading
//! columns.

use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{OptionChain, OptionContract, OptionType};

/// Expected columns in the chains CSV.
pub const EXPECTED_COLUMNS: &[&str] = &[
    "data_date",
    "strike",
    "symbol",
    "ticker",
    "strike_date",
    "option_type",
    "broker_price",
];

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("Unknown option type {value:?} in row {row}")]
    UnknownOptionType { row: usize, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// CSV loader for option-chain records.
pub struct ChainLoader {
    path: String,
}

impl ChainLoader {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }

    /// Load the raw CSV as a DataFrame with a normalized header.
    pub fn load_dataframe(&self) -> Result<DataFrame, ChainError> {
        if !Path::new(&self.path).exists() {
            return Err(ChainError::FileNotFound(self.path.clone()));
        }

        let lf = LazyCsvReader::new(&self.path)
            .with_has_header(true)
            .finish()?;
        let mut df = lf.collect()?;

        // BOM artifact: the first header cell may arrive mangled.
        let first = df
            .get_column_names()
            .first()
            .map(|s| s.to_string())
            .unwrap_or_default();
        if first != "data_date" {
            df.rename(&first, "data_date".into())?;
        }

        for name in EXPECTED_COLUMNS {
            if df.column(name).is_err() {
                return Err(ChainError::MissingColumn(name.to_string()));
            }
        }

        Ok(df)
    }

    /// Load and group all records into chains, preserving input order.
    pub fn load_chains(&self) -> Result<Vec<OptionChain>, ChainError> {
        let df = self.load_dataframe()?;
        let records = dataframe_to_records(&df)?;
        Ok(group_chains(records))
    }
}

fn parse_date(s: &str, row: usize, field: &str) -> Result<NaiveDate, ChainError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| ChainError::InvalidRow {
        row,
        reason: format!("bad {}: {}", field, e),
    })
}

fn missing(row: usize, field: &str) -> ChainError {
    ChainError::InvalidRow {
        row,
        reason: format!("missing {}", field),
    }
}

/// Convert the DataFrame into contract records, one per row.
fn dataframe_to_records(df: &DataFrame) -> Result<Vec<OptionContract>, ChainError> {
    let data_date_col = df.column("data_date")?.str()?.clone();
    let symbol_col = df.column("symbol")?.str()?.clone();
    let ticker_col = df.column("ticker")?.str()?.clone();
    let strike_date_col = df.column("strike_date")?.str()?.clone();
    let option_type_col = df.column("option_type")?.str()?.clone();
    let strike_cast = df.column("strike")?.cast(&DataType::Float64)?;
    let strike_col = strike_cast.f64()?;
    let price_cast = df.column("broker_price")?.cast(&DataType::Float64)?;
    let price_col = price_cast.f64()?;

    let mut records = Vec::with_capacity(df.height());

    for idx in 0..df.height() {
        let valuation_date = parse_date(
            data_date_col.get(idx).ok_or_else(|| missing(idx, "data_date"))?,
            idx,
            "data_date",
        )?;
        let strike_date = parse_date(
            strike_date_col
                .get(idx)
                .ok_or_else(|| missing(idx, "strike_date"))?,
            idx,
            "strike_date",
        )?;
        if strike_date <= valuation_date {
            return Err(ChainError::InvalidRow {
                row: idx,
                reason: format!("strike date {} not after {}", strike_date, valuation_date),
            });
        }

        let type_str = option_type_col
            .get(idx)
            .ok_or_else(|| missing(idx, "option_type"))?;
        let option_type =
            OptionType::from_str(type_str).ok_or_else(|| ChainError::UnknownOptionType {
                row: idx,
                value: type_str.to_string(),
            })?;

        let strike_val = strike_col.get(idx).ok_or_else(|| missing(idx, "strike"))?;
        if strike_val <= 0.0 {
            return Err(ChainError::InvalidRow {
                row: idx,
                reason: format!("strike must be positive, got {}", strike_val),
            });
        }
        // Cent precision from the start; float-parsed cells carry binary noise.
        let strike = Decimal::from_f64_retain(strike_val)
            .map(|d| d.round_dp(2))
            .ok_or_else(|| ChainError::InvalidRow {
                row: idx,
                reason: "unrepresentable strike".to_string(),
            })?;

        let price_val = price_col
            .get(idx)
            .ok_or_else(|| missing(idx, "broker_price"))?;
        if price_val < 0.0 {
            return Err(ChainError::InvalidRow {
                row: idx,
                reason: format!("broker price must be non-negative, got {}", price_val),
            });
        }
        let broker_price = Decimal::from_f64_retain(price_val)
            .map(|d| d.round_dp(2))
            .ok_or_else(|| ChainError::InvalidRow {
                row: idx,
                reason: "unrepresentable broker price".to_string(),
            })?;

        records.push(OptionContract {
            symbol: symbol_col
                .get(idx)
                .ok_or_else(|| missing(idx, "symbol"))?
                .to_string(),
            ticker: ticker_col
                .get(idx)
                .ok_or_else(|| missing(idx, "ticker"))?
                .to_string(),
            valuation_date,
            strike_date,
            strike,
            option_type,
            broker_price,
        });
    }

    Ok(records)
}

/// Group consecutive records sharing (valuation date, ticker) into chains.
///
/// Every record lands in exactly one chain, including the final group.
pub fn group_chains(records: Vec<OptionContract>) -> Vec<OptionChain> {
    let mut chains: Vec<OptionChain> = Vec::new();

    for record in records {
        match chains.last_mut() {
            Some(chain) if chain.accepts(&record) => chain.contracts.push(record),
            _ => chains.push(OptionChain::from_contract(record)),
        }
    }

    chains
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(data_date: &str, ticker: &str, strike: Decimal) -> OptionContract {
        OptionContract {
            symbol: format!("{}-{}", ticker, strike),
            ticker: ticker.to_string(),
            valuation_date: NaiveDate::parse_from_str(data_date, "%Y-%m-%d").unwrap(),
            strike_date: NaiveDate::parse_from_str("2023-06-16", "%Y-%m-%d").unwrap(),
            strike,
            option_type: OptionType::Put,
            broker_price: dec!(1.25),
        }
    }

    #[test]
    fn test_group_chains_by_consecutive_key() {
        let records = vec![
            record("2023-05-01", "AAPL", dec!(150)),
            record("2023-05-01", "AAPL", dec!(155)),
            record("2023-05-01", "MSFT", dec!(300)),
            record("2023-05-08", "AAPL", dec!(150)),
        ];

        let chains = group_chains(records);
        assert_eq!(chains.len(), 3);
        assert_eq!(chains[0].len(), 2);
        assert_eq!(chains[0].ticker, "AAPL");
        assert_eq!(chains[1].len(), 1);
        assert_eq!(chains[1].ticker, "MSFT");
        // The trailing group is retained.
        assert_eq!(chains[2].len(), 1);
    }

    #[test]
    fn test_group_chains_no_duplicate_first_row() {
        let records = vec![record("2023-05-01", "AAPL", dec!(150))];
        let chains = group_chains(records);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].len(), 1);
    }

    #[test]
    fn test_group_chains_empty() {
        assert!(group_chains(vec![]).is_empty());
    }

    #[test]
    fn test_parsed_money_rounds_to_cents() {
        // 100.6 has no exact binary representation; the stored decimal must
        // still be exactly two places so strict strike comparisons hold.
        let df = df![
            "data_date" => ["2023-05-01"],
            "strike" => [100.6f64],
            "symbol" => ["AAPL230616C00100600"],
            "ticker" => ["AAPL"],
            "strike_date" => ["2023-06-16"],
            "option_type" => ["C"],
            "broker_price" => [2.57f64],
        ]
        .unwrap();

        let records = dataframe_to_records(&df).unwrap();
        assert_eq!(records[0].strike, dec!(100.60));
        assert_eq!(records[0].broker_price, dec!(2.57));
    }

    #[test]
    fn test_missing_file() {
        let loader = ChainLoader::new("/nonexistent/chains.csv");
        assert!(matches!(
            loader.load_chains(),
            Err(ChainError::FileNotFound(_))
        ));
    }
}
