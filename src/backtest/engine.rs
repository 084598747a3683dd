//! Backtest orchestration.
//!
//! Walks historical option chains in order. For each chain the engine pulls
//! the realized daily close path from valuation to expiry and a volatility
//! forecast as of the valuation date, then prices every contract on the
//! lattice, applies the underpricing rule, and settles bought positions
//! through the exercise simulator against the realized path.
//!
//! A run never aborts on bad data: a chain whose path or forecast is
//! unavailable is skipped whole, and a contract that fails to price is
//! skipped individually, both logged at warn level.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::{OptionChain, OptionContract, OptionType, PriceHistory};
use crate::pricing::AmericanBinomial;
use crate::volatility::{GarchConfig, VolatilityForecaster};

use super::account::Account;
use super::decision::{DecisionRule, TradeDecision};
use super::exercise::{ExerciseSimulator, PositionState};

/// Backtest parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Consecutive in-the-money closes required before exercising.
    pub exercise_lag: u32,
    /// Buy only when fair value beats the quote by more than this fraction.
    pub buy_threshold_pct: Decimal,
    /// Per-step risk-free rate fed to the lattice.
    pub risk_free_rate: f64,
    /// Number of lattice time steps.
    pub lattice_steps: usize,
    /// Option maturity in lattice time units.
    pub maturity: f64,
    /// Volatility model settings.
    pub garch: GarchConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            exercise_lag: 3,
            buy_threshold_pct: Decimal::new(10, 2),
            risk_free_rate: 0.003,
            lattice_steps: 1,
            maturity: 1.0,
            garch: GarchConfig::default(),
        }
    }
}

/// One contract's journey through the backtest.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub ticker: String,
    pub valuation_date: NaiveDate,
    pub strike: Decimal,
    pub option_type: OptionType,
    pub broker_price: Decimal,
    pub fair_value: Decimal,
    pub volatility: f64,
    pub decision: TradeDecision,
    pub premium: Option<Decimal>,
    pub outcome: Option<PositionState>,
    pub balance_after: Decimal,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub final_balance: Decimal,
    pub chains: usize,
    pub contracts: usize,
    pub buys: usize,
    pub exercised: usize,
    pub expired: usize,
    pub skipped: usize,
    pub records: Vec<TradeRecord>,
}

impl BacktestResult {
    pub fn summary(&self) -> String {
        format!(
            "{} chains, {} contracts ({} skipped): {} bought, {} exercised, {} expired, final balance {}",
            self.chains,
            self.contracts,
            self.skipped,
            self.buys,
            self.exercised,
            self.expired,
            self.final_balance,
        )
    }
}

/// Chain-by-chain backtest driver.
pub struct Backtester<'a, H: PriceHistory, F: VolatilityForecaster> {
    config: BacktestConfig,
    pricer: AmericanBinomial,
    rule: DecisionRule,
    simulator: ExerciseSimulator,
    history: &'a H,
    forecaster: &'a F,
}

impl<'a, H: PriceHistory, F: VolatilityForecaster> Backtester<'a, H, F> {
    pub fn new(config: BacktestConfig, history: &'a H, forecaster: &'a F) -> Self {
        let pricer = AmericanBinomial {
            rate: config.risk_free_rate,
            steps: config.lattice_steps,
        };
        let rule = DecisionRule::new(config.buy_threshold_pct);
        let simulator = ExerciseSimulator::new(config.exercise_lag);
        Self {
            config,
            pricer,
            rule,
            simulator,
            history,
            forecaster,
        }
    }

    /// Run the full backtest over `chains` in input order.
    pub fn run(&self, chains: &[OptionChain]) -> BacktestResult {
        let mut account = Account::new();
        let mut result = BacktestResult {
            final_balance: Decimal::ZERO,
            chains: chains.len(),
            contracts: 0,
            buys: 0,
            exercised: 0,
            expired: 0,
            skipped: 0,
            records: Vec::new(),
        };

        for chain in chains {
            result.contracts += chain.len();
            self.process_chain(chain, &mut account, &mut result);
        }

        result.final_balance = account.balance();
        result
    }

    fn process_chain(&self, chain: &OptionChain, account: &mut Account, result: &mut BacktestResult) {
        let Some(expiry) = chain.strike_date() else {
            return;
        };
        let path = match self
            .history
            .daily_closes(&chain.ticker, chain.valuation_date, expiry)
        {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    ticker = %chain.ticker,
                    date = %chain.valuation_date,
                    "skipping chain, no price path: {e}"
                );
                result.skipped += chain.len();
                return;
            }
        };

        let volatility = match self.forecaster.forecast(&chain.ticker, chain.valuation_date) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    ticker = %chain.ticker,
                    date = %chain.valuation_date,
                    "skipping chain, no volatility forecast: {e}"
                );
                result.skipped += chain.len();
                return;
            }
        };

        let spot = path[0].close.round_dp(2);
        let closes: Vec<Decimal> = path.iter().map(|bar| bar.close).collect();
        debug!(
            ticker = %chain.ticker,
            date = %chain.valuation_date,
            %spot,
            volatility,
            contracts = chain.len(),
            "processing chain"
        );

        for contract in &chain.contracts {
            self.process_contract(contract, spot, volatility, &closes, account, result);
        }
    }

    fn process_contract(
        &self,
        contract: &OptionContract,
        spot: Decimal,
        volatility: f64,
        closes: &[Decimal],
        account: &mut Account,
        result: &mut BacktestResult,
    ) {
        let fair_value = match self.fair_value(contract, spot, volatility) {
            Ok(fair) => fair,
            Err(e) => {
                warn!(symbol = %contract.symbol, "skipping contract: {e}");
                result.skipped += 1;
                return;
            }
        };

        let decision = self.rule.decide(fair_value, contract.broker_price);
        let mut premium = None;
        let mut outcome = None;

        if decision == TradeDecision::Buy {
            result.buys += 1;
            let paid = self.rule.premium(contract.broker_price);
            account.apply(-paid);
            premium = Some(paid);

            match self
                .simulator
                .simulate(contract.option_type, contract.strike, closes)
            {
                Ok(state) => {
                    match &state {
                        PositionState::Exercised { profit, .. } => {
                            result.exercised += 1;
                            account.apply(*profit);
                        }
                        PositionState::Expired => result.expired += 1,
                        PositionState::Open { .. } => {}
                    }
                    outcome = Some(state);
                }
                Err(e) => {
                    warn!(symbol = %contract.symbol, "position not settled: {e}");
                    result.skipped += 1;
                }
            }
        }

        result.records.push(TradeRecord {
            symbol: contract.symbol.clone(),
            ticker: contract.ticker.clone(),
            valuation_date: contract.valuation_date,
            strike: contract.strike,
            option_type: contract.option_type,
            broker_price: contract.broker_price,
            fair_value,
            volatility,
            decision,
            premium,
            outcome,
            balance_after: account.balance(),
        });
    }

    /// Lattice fair value for one contract, rounded to cents.
    fn fair_value(
        &self,
        contract: &OptionContract,
        spot: Decimal,
        volatility: f64,
    ) -> Result<Decimal, PricingFailure> {
        let spot_f = spot.to_f64().ok_or(PricingFailure::Conversion)?;
        let strike_f = contract.strike.to_f64().ok_or(PricingFailure::Conversion)?;
        let raw = self
            .pricer
            .price(
                spot_f,
                strike_f,
                self.config.maturity,
                volatility,
                contract.option_type,
            )
            .map_err(PricingFailure::Lattice)?;
        Decimal::from_f64_retain(raw)
            .map(|d| d.round_dp(2))
            .ok_or(PricingFailure::Conversion)
    }
}

#[derive(Debug, thiserror::Error)]
enum PricingFailure {
    #[error(transparent)]
    Lattice(crate::pricing::LatticeError),
    #[error("value not representable as a decimal")]
    Conversion,
}
