//! Running cash account for the backtest.

use rust_decimal::Decimal;
use serde::Serialize;

/// Cash account tracking cumulative profit and loss.
///
/// Every posting is rounded to cents immediately, so the balance is always
/// an exact two-decimal figure and postings commute with reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Account {
    balance: Decimal,
}

impl Account {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signed cash delta and round the balance to cents.
    pub fn apply(&mut self, delta: Decimal) -> Decimal {
        self.balance = (self.balance + delta).round_dp(2);
        self.balance
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_accumulates() {
        let mut account = Account::new();
        account.apply(dec!(10.50));
        account.apply(dec!(-3.25));
        assert_eq!(account.balance(), dec!(7.25));
    }

    #[test]
    fn test_balance_rounds_to_cents() {
        let mut account = Account::new();
        assert_eq!(account.apply(dec!(1.005)), dec!(1.00));
        assert_eq!(account.apply(dec!(0.015)), dec!(1.02));
    }

    #[test]
    fn test_negative_balance_allowed() {
        let mut account = Account::new();
        account.apply(dec!(-125.00));
        assert_eq!(account.balance(), dec!(-125.00));
    }
}
