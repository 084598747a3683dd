//! American option valuation on a general additive binomial lattice.
//!
//! Implements the additive (log-space) binomial scheme from Clewlow &
//! Strickland, "Implementing Derivatives Models" (1998), ch. 2: symmetric
//! up/down moves in log-price, risk-neutral probabilities derived from the
//! drift, and backward induction with an early-exercise floor applied at
//! every node. The floor is what makes the valuation American rather than
//! European.
//!
//! The engine is deterministic and performs no I/O. Lattice arrays are
//! allocated fresh per call and discarded; nothing is cached between
//! valuations.

use thiserror::Error;

use crate::data::OptionType;

/// Errors from lattice valuation.
///
/// All of these are contract violations on the inputs; the engine never
/// silently substitutes a default.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LatticeError {
    #[error("lattice requires at least one time step")]
    NoSteps,

    #[error("strike must be positive, got {0}")]
    InvalidStrike(f64),

    #[error("spot must be positive, got {0}")]
    InvalidSpot(f64),

    #[error("maturity must be positive, got {0}")]
    InvalidMaturity(f64),

    #[error("volatility must be non-negative, got {0}")]
    NegativeVolatility(f64),

    #[error("risk-neutral up-probability {pu} outside [0, 1]")]
    DegenerateProbability { pu: f64 },
}

/// American option pricer on an additive binomial lattice.
///
/// `rate` is the risk-free rate per lattice step, on the same time unit as
/// one unit of `maturity`. The backtest runs with one calendar month per
/// step, so `rate` there is a monthly rate; the pricer itself is agnostic.
#[derive(Debug, Clone, Copy)]
pub struct AmericanBinomial {
    /// Risk-free rate per unit of maturity.
    pub rate: f64,
    /// Number of time steps the maturity is discretized into.
    pub steps: usize,
}

impl AmericanBinomial {
    pub fn new(rate: f64, steps: usize) -> Self {
        Self { rate, steps }
    }

    fn intrinsic(option_type: OptionType, strike: f64, price: f64) -> f64 {
        match option_type {
            OptionType::Call => (price - strike).max(0.0),
            OptionType::Put => (strike - price).max(0.0),
        }
    }

    /// Price an American option.
    ///
    /// `maturity` is expressed in step units (`dt = maturity / steps`), and
    /// `vol` is a volatility per sqrt-unit of maturity, not a variance.
    pub fn price(
        &self,
        spot: f64,
        strike: f64,
        maturity: f64,
        vol: f64,
        option_type: OptionType,
    ) -> Result<f64, LatticeError> {
        if self.steps == 0 {
            return Err(LatticeError::NoSteps);
        }
        if !(strike > 0.0) {
            return Err(LatticeError::InvalidStrike(strike));
        }
        if !(spot > 0.0) {
            return Err(LatticeError::InvalidSpot(spot));
        }
        if !(maturity > 0.0) {
            return Err(LatticeError::InvalidMaturity(maturity));
        }
        if !(vol >= 0.0) {
            return Err(LatticeError::NegativeVolatility(vol));
        }

        let n = self.steps;
        let dt = maturity / n as f64;
        let nu = self.rate - 0.5 * vol * vol;

        // Symmetric log-space steps.
        let dxu = (vol * vol * dt + (nu * dt).powi(2)).sqrt();
        let dxd = -dxu;

        // Zero volatility and zero drift collapse the lattice to a single
        // path; the option is worth its intrinsic value.
        if dxu == 0.0 {
            return Ok(Self::intrinsic(option_type, strike, spot));
        }

        // dxu >= |nu * dt| by construction, so pu stays in [0, 1] for any
        // finite inputs; the check rejects non-finite parameter combinations.
        let pu = 0.5 + 0.5 * (nu * dt / dxu);
        if !(0.0..=1.0).contains(&pu) {
            return Err(LatticeError::DegenerateProbability { pu });
        }

        let disc = (-self.rate * dt).exp();
        let dpu = disc * pu;
        let dpd = disc * (1.0 - pu);
        let edxud = (dxu - dxd).exp();
        let edxd = dxd.exp();

        // Terminal asset prices, strictly ascending from the lowest node.
        let mut asset = vec![0.0; n + 1];
        asset[0] = spot * (n as f64 * dxd).exp();
        for j in 1..=n {
            asset[j] = asset[j - 1] * edxud;
        }

        // Terminal option values are the intrinsic payoffs.
        let mut value: Vec<f64> = asset
            .iter()
            .map(|&s| Self::intrinsic(option_type, strike, s))
            .collect();

        // Backward induction. At each earlier level the asset prices are
        // rescaled down one step in place (the classic lattice collapse),
        // and the early-exercise floor is applied per node.
        for level in (1..=n).rev() {
            for j in 0..level {
                value[j] = dpu * value[j + 1] + dpd * value[j];
                asset[j] /= edxd;
                value[j] = value[j].max(Self::intrinsic(option_type, strike, asset[j]));
            }
        }

        Ok(value[0])
    }

    /// Price an American call.
    pub fn call_price(&self, spot: f64, strike: f64, maturity: f64, vol: f64) -> Result<f64, LatticeError> {
        self.price(spot, strike, maturity, vol, OptionType::Call)
    }

    /// Price an American put.
    pub fn put_price(&self, spot: f64, strike: f64, maturity: f64, vol: f64) -> Result<f64, LatticeError> {
        self.price(spot, strike, maturity, vol, OptionType::Put)
    }
}
