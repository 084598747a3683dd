//! Underpricing trade rule.
//!
//! A contract is bought only when the lattice fair value exceeds the broker
//! quote by more than a configured fraction. The comparison runs in exact
//! decimal arithmetic so a quote sitting exactly at the threshold never
//! flips on float noise.

use rust_decimal::Decimal;
use serde::Serialize;

/// Shares controlled by one contract.
pub const CONTRACT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDecision {
    Buy,
    Pass,
}

/// Buy-if-underpriced rule.
#[derive(Debug, Clone)]
pub struct DecisionRule {
    threshold_pct: Decimal,
}

impl DecisionRule {
    pub fn new(threshold_pct: Decimal) -> Self {
        Self { threshold_pct }
    }

    /// Buy iff `fair_value > broker_price * (1 + threshold)`.
    ///
    /// At exactly the threshold the edge is not strict, so the rule passes.
    pub fn decide(&self, fair_value: Decimal, broker_price: Decimal) -> TradeDecision {
        if fair_value > broker_price * (Decimal::ONE + self.threshold_pct) {
            TradeDecision::Buy
        } else {
            TradeDecision::Pass
        }
    }

    /// Cash outlay for one contract at the quoted per-share price.
    pub fn premium(&self, broker_price: Decimal) -> Decimal {
        (broker_price * CONTRACT_MULTIPLIER).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buy_when_underpriced() {
        let rule = DecisionRule::new(dec!(0.10));
        assert_eq!(rule.decide(dec!(2.21), dec!(2.00)), TradeDecision::Buy);
    }

    #[test]
    fn test_pass_when_fairly_priced() {
        let rule = DecisionRule::new(dec!(0.10));
        assert_eq!(rule.decide(dec!(1.95), dec!(2.00)), TradeDecision::Pass);
    }

    #[test]
    fn test_pass_at_exact_threshold() {
        // fair == broker * 1.10 exactly: no strict edge.
        let rule = DecisionRule::new(dec!(0.10));
        assert_eq!(rule.decide(dec!(2.20), dec!(2.00)), TradeDecision::Pass);
    }

    #[test]
    fn test_zero_threshold_needs_any_edge() {
        let rule = DecisionRule::new(Decimal::ZERO);
        assert_eq!(rule.decide(dec!(2.00), dec!(2.00)), TradeDecision::Pass);
        assert_eq!(rule.decide(dec!(2.01), dec!(2.00)), TradeDecision::Buy);
    }

    #[test]
    fn test_premium_scales_by_multiplier() {
        let rule = DecisionRule::new(dec!(0.10));
        assert_eq!(rule.premium(dec!(1.255)), dec!(125.50));
    }
}
