pub mod backtest;
pub mod data;
pub mod pricing;
pub mod volatility;

pub use backtest::{BacktestConfig, BacktestResult, Backtester};
pub use pricing::AmericanBinomial;
pub use volatility::{GarchForecaster, VolatilityForecaster};
