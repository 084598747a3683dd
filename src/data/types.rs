//! Core data types for the option backtest.
//!
//! Money (strikes, premiums, closes) is `rust_decimal::Decimal`; model
//! inputs to the lattice are plain `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Parse from a record field. Anything outside call/put is rejected by
    /// the caller, never defaulted.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

/// A single listed contract as observed on the valuation date.
///
/// Immutable once constructed by the chain loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    /// Display symbol (e.g., "AAPL230616C00150000").
    pub symbol: String,

    /// Underlying ticker.
    pub ticker: String,

    /// Date the quote was observed.
    pub valuation_date: NaiveDate,

    /// Expiration / strike date.
    pub strike_date: NaiveDate,

    /// Strike price.
    pub strike: Decimal,

    /// Call or put.
    pub option_type: OptionType,

    /// Price quoted by the broker for this contract.
    pub broker_price: Decimal,
}

impl OptionContract {
    /// Calendar days from valuation to expiration.
    pub fn days_to_expiry(&self) -> i64 {
        (self.strike_date - self.valuation_date).num_days()
    }
}

/// Daily closing price observation for an underlying.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: Decimal,
}

/// All contracts sharing one (valuation date, underlying) pair.
#[derive(Debug, Clone, Default)]
pub struct OptionChain {
    /// Valuation date shared by every contract in the chain.
    pub valuation_date: NaiveDate,

    /// Underlying ticker shared by every contract in the chain.
    pub ticker: String,

    /// Contracts in input order.
    pub contracts: Vec<OptionContract>,
}

impl OptionChain {
    /// Start a new chain from its first contract.
    pub fn from_contract(contract: OptionContract) -> Self {
        Self {
            valuation_date: contract.valuation_date,
            ticker: contract.ticker.clone(),
            contracts: vec![contract],
        }
    }

    /// Whether a record belongs to this chain (same valuation date and
    /// underlying).
    pub fn accepts(&self, contract: &OptionContract) -> bool {
        self.valuation_date == contract.valuation_date && self.ticker == contract.ticker
    }

    /// Expiration date of the chain, taken from its first contract.
    pub fn strike_date(&self) -> Option<NaiveDate> {
        self.contracts.first().map(|c| c.strike_date)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
