//! Early-exercise simulation over a realized price path.
//!
//! A held American option is exercised once it has closed in the money for a
//! configured number of consecutive days. A single out-of-the-money close
//! resets the streak. If the streak never completes before the path ends,
//! the position expires worthless.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::data::OptionType;

use super::decision::CONTRACT_MULTIPLIER;

#[derive(Error, Debug)]
pub enum ExerciseError {
    #[error("price path is empty")]
    EmptyPath,
}

/// Lifecycle of one held contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum PositionState {
    /// Still held, with the current in-the-money streak length.
    Open { lag: u32 },
    /// Exercised on `day` (1-based index into the path) at `price`.
    Exercised {
        day: usize,
        price: Decimal,
        profit: Decimal,
    },
    /// Held to the end of the path without exercising.
    Expired,
}

impl PositionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionState::Open { .. })
    }
}

/// Streak-confirmation exercise policy.
#[derive(Debug, Clone)]
pub struct ExerciseSimulator {
    exercise_lag: u32,
}

impl ExerciseSimulator {
    pub fn new(exercise_lag: u32) -> Self {
        Self { exercise_lag }
    }

    /// Advance the position by one daily close.
    ///
    /// `day` is the 1-based position of `close` in the path. Prices are
    /// compared at cent precision, matching how fills settle.
    fn step(
        &self,
        state: PositionState,
        option_type: OptionType,
        strike: Decimal,
        day: usize,
        close: Decimal,
    ) -> PositionState {
        let lag = match state {
            PositionState::Open { lag } => lag,
            terminal => return terminal,
        };

        let price = close.round_dp(2);
        let in_the_money = match option_type {
            OptionType::Call => price > strike,
            OptionType::Put => price < strike,
        };

        if !in_the_money {
            return PositionState::Open { lag: 0 };
        }

        let lag = lag + 1;
        if lag >= self.exercise_lag {
            let intrinsic = match option_type {
                OptionType::Call => price - strike,
                OptionType::Put => strike - price,
            };
            let profit = (intrinsic * CONTRACT_MULTIPLIER).round_dp(2);
            PositionState::Exercised { day, price, profit }
        } else {
            PositionState::Open { lag }
        }
    }

    /// Run the position over a full path of daily closes.
    ///
    /// Returns [`PositionState::Expired`] when the path ends with the
    /// position still open.
    pub fn simulate(
        &self,
        option_type: OptionType,
        strike: Decimal,
        path: &[Decimal],
    ) -> Result<PositionState, ExerciseError> {
        if path.is_empty() {
            return Err(ExerciseError::EmptyPath);
        }

        let mut state = PositionState::Open { lag: 0 };
        for (i, &close) in path.iter().enumerate() {
            state = self.step(state, option_type, strike, i + 1, close);
            if state.is_terminal() {
                return Ok(state);
            }
        }
        Ok(PositionState::Expired)
    }
}
