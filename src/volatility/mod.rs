//! Volatility forecasting for the pricing engine.
//!
//! The backtest consumes the [`VolatilityForecaster`] trait: a single
//! non-negative one-period VOLATILITY (standard deviation, never a
//! variance) for an underlying as of a date. The shipped implementation is
//! a GARCH(1,1) fit over monthly returns.

pub mod garch;

use chrono::NaiveDate;
use thiserror::Error;

use crate::data::HistoryError;

pub use garch::{lookback_start, GarchConfig, GarchForecaster, Innovation};

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("insufficient return history: need {needed} observations, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("unsupported GARCH order ({p}, {q}); only (1, 1) is implemented")]
    UnsupportedOrder { p: usize, q: usize },

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// One-period-ahead volatility forecast seam.
pub trait VolatilityForecaster {
    /// Forecast the next-period volatility of `ticker` as of `asof`.
    fn forecast(&self, ticker: &str, asof: NaiveDate) -> Result<f64, ForecastError>;
}
