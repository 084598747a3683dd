//! Historical backtest of the underpricing strategy.

pub mod account;
pub mod decision;
pub mod engine;
pub mod exercise;

pub use account::Account;
pub use decision::{DecisionRule, TradeDecision, CONTRACT_MULTIPLIER};
pub use engine::{BacktestConfig, BacktestResult, Backtester, TradeRecord};
pub use exercise::{ExerciseError, ExerciseSimulator, PositionState};
