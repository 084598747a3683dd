//! GARCH(1,1) volatility forecasting over monthly returns.
//!
//! Zero-mean GARCH(1,1) with variance targeting: `omega` is pinned to the
//! sample variance via `omega = var·(1 − alpha − beta)`, and `(alpha, beta)`
//! are chosen by maximizing the conditional log-likelihood on a coarse grid
//! followed by one local refinement. Innovations are normal or Student-t;
//! the t degrees of freedom are estimated from the kurtosis of the
//! standardized returns (method of moments).
//!
//! The forecaster returns a VOLATILITY: the one-step-ahead conditional
//! variance is square-rooted before it leaves this module.

use std::f64::consts::PI;

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

use super::{ForecastError, VolatilityForecaster};
use crate::data::PriceHistory;

/// Minimum number of return observations for a fit.
const MIN_OBSERVATIONS: usize = 12;

/// Innovation distribution for the GARCH likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Innovation {
    Normal,
    #[serde(alias = "t", alias = "student_t")]
    StudentT,
}

/// GARCH model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GarchConfig {
    /// Years of monthly history to fit on.
    pub lookback_years: i32,
    /// ARCH order. Only 1 is supported.
    pub p: usize,
    /// GARCH order. Only 1 is supported.
    pub q: usize,
    /// Innovation distribution.
    pub innovation: Innovation,
}

impl Default for GarchConfig {
    fn default() -> Self {
        Self {
            lookback_years: 1,
            p: 1,
            q: 1,
            innovation: Innovation::StudentT,
        }
    }
}

/// GARCH(1,1) forecaster over a price-history source.
pub struct GarchForecaster<'a, H: PriceHistory> {
    history: &'a H,
    config: GarchConfig,
}

impl<'a, H: PriceHistory> GarchForecaster<'a, H> {
    pub fn new(history: &'a H, config: GarchConfig) -> Self {
        Self { history, config }
    }
}

impl<H: PriceHistory> VolatilityForecaster for GarchForecaster<'_, H> {
    fn forecast(&self, ticker: &str, asof: NaiveDate) -> Result<f64, ForecastError> {
        if (self.config.p, self.config.q) != (1, 1) {
            return Err(ForecastError::UnsupportedOrder {
                p: self.config.p,
                q: self.config.q,
            });
        }

        let start = lookback_start(asof, self.config.lookback_years);

        let bars = self.history.monthly_closes(ticker, start, asof)?;

        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(0.0))
            .collect();
        let returns: Vec<f64> = closes
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();

        if returns.len() < MIN_OBSERVATIONS {
            return Err(ForecastError::InsufficientHistory {
                needed: MIN_OBSERVATIONS,
                got: returns.len(),
            });
        }

        let fit = fit_garch11(&returns, self.config.innovation);
        Ok(fit.forecast_volatility(&returns))
    }
}

/// Start of the return lookback window ending at `asof`.
///
/// A date with no same-day counterpart `years` back (Feb 29) falls back to
/// day counting.
pub fn lookback_start(asof: NaiveDate, years: i32) -> NaiveDate {
    let years = years.max(0);
    asof.with_year(asof.year() - years)
        .unwrap_or_else(|| asof - Days::new(365 * years as u64))
}

/// Fitted GARCH(1,1) parameters.
#[derive(Debug, Clone, Copy)]
pub struct Garch11Fit {
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    /// Conditional variance of the final observation.
    pub last_variance: f64,
}

impl Garch11Fit {
    /// One-step-ahead conditional variance.
    pub fn forecast_variance(&self, returns: &[f64]) -> f64 {
        let last_r2 = returns.last().map(|r| r * r).unwrap_or(0.0);
        (self.omega + self.alpha * last_r2 + self.beta * self.last_variance).max(0.0)
    }

    /// One-step-ahead conditional volatility.
    pub fn forecast_volatility(&self, returns: &[f64]) -> f64 {
        self.forecast_variance(returns).sqrt()
    }
}

/// Conditional variance recursion seeded at the sample variance.
fn conditional_variances(returns: &[f64], omega: f64, alpha: f64, beta: f64, h0: f64) -> Vec<f64> {
    let mut h = Vec::with_capacity(returns.len());
    h.push(h0);
    for t in 1..returns.len() {
        let prev_r = returns[t - 1];
        let prev_h = h[t - 1];
        h.push(omega + alpha * prev_r * prev_r + beta * prev_h);
    }
    h
}

/// Log-density of a unit-variance innovation `z` under the model.
fn ln_innovation_density(z: f64, innovation: Innovation, nu: f64) -> f64 {
    match innovation {
        Innovation::Normal => -0.5 * ((2.0 * PI).ln() + z * z),
        Innovation::StudentT => {
            // Student-t scaled to unit variance: z = s * t_nu, s^2 = (nu-2)/nu.
            let s = ((nu - 2.0) / nu).sqrt();
            let x = z / s;
            ln_gamma((nu + 1.0) / 2.0)
                - ln_gamma(nu / 2.0)
                - 0.5 * (nu * PI).ln()
                - (nu + 1.0) / 2.0 * (1.0 + x * x / nu).ln()
                - s.ln()
        }
    }
}

fn log_likelihood(returns: &[f64], h: &[f64], innovation: Innovation, nu: f64) -> f64 {
    returns
        .iter()
        .zip(h.iter())
        .map(|(&r, &hv)| {
            if hv <= 0.0 {
                return f64::NEG_INFINITY;
            }
            let z = r / hv.sqrt();
            ln_innovation_density(z, innovation, nu) - 0.5 * hv.ln()
        })
        .sum()
}

/// Method-of-moments Student-t degrees of freedom from standardized data.
///
/// Kurtosis of t_nu is 3(nu-2)/(nu-4), inverted and clamped to [4.1, 30].
fn student_t_dof(z: &[f64]) -> f64 {
    let n = z.len() as f64;
    if n < 4.0 {
        return 30.0;
    }
    let m2 = z.iter().map(|v| v * v).sum::<f64>() / n;
    let m4 = z.iter().map(|v| v.powi(4)).sum::<f64>() / n;
    if m2 <= 0.0 {
        return 30.0;
    }
    let kurt = m4 / (m2 * m2);
    if kurt <= 3.1 {
        return 30.0;
    }
    ((4.0 * kurt - 6.0) / (kurt - 3.0)).clamp(4.1, 30.0)
}

/// Fit GARCH(1,1) by variance-targeted grid search.
pub fn fit_garch11(returns: &[f64], innovation: Innovation) -> Garch11Fit {
    let n = returns.len() as f64;
    let sample_var = returns.iter().map(|r| r * r).sum::<f64>() / n;

    if sample_var <= 0.0 {
        // Flat price history: no uncertainty to model.
        return Garch11Fit {
            omega: 0.0,
            alpha: 0.0,
            beta: 0.0,
            last_variance: 0.0,
        };
    }

    let sample_sd = sample_var.sqrt();
    let standardized: Vec<f64> = returns.iter().map(|r| r / sample_sd).collect();
    let nu = student_t_dof(&standardized);

    let evaluate = |alpha: f64, beta: f64| -> (f64, f64) {
        let omega = sample_var * (1.0 - alpha - beta);
        let h = conditional_variances(returns, omega, alpha, beta, sample_var);
        let last = *h.last().unwrap_or(&sample_var);
        (log_likelihood(returns, &h, innovation, nu), last)
    };

    let mut best = (0.05, 0.90);
    let mut best_ll = f64::NEG_INFINITY;
    let mut best_last = sample_var;

    // Coarse grid.
    let mut alpha = 0.02;
    while alpha <= 0.30 + 1e-9 {
        let mut beta = 0.50;
        while beta <= 0.96 + 1e-9 {
            if alpha + beta < 0.999 {
                let (ll, last) = evaluate(alpha, beta);
                if ll > best_ll {
                    best_ll = ll;
                    best = (alpha, beta);
                    best_last = last;
                }
            }
            beta += 0.02;
        }
        alpha += 0.02;
    }

    // One local refinement around the coarse optimum.
    let (a0, b0) = best;
    let mut da = -0.02;
    while da <= 0.02 + 1e-9 {
        let mut db = -0.02;
        while db <= 0.02 + 1e-9 {
            let alpha = (a0 + da).max(0.001);
            let beta = (b0 + db).max(0.0);
            if alpha + beta < 0.999 {
                let (ll, last) = evaluate(alpha, beta);
                if ll > best_ll {
                    best_ll = ll;
                    best = (alpha, beta);
                    best_last = last;
                }
            }
            db += 0.005;
        }
        da += 0.005;
    }

    let (alpha, beta) = best;
    Garch11Fit {
        omega: sample_var * (1.0 - alpha - beta),
        alpha,
        beta,
        last_variance: best_last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{InMemoryHistory, PriceBar};
    use rust_decimal::Decimal;

    fn monthly_bars(closes: &[f64]) -> Vec<PriceBar> {
        monthly_bars_from(2020, closes)
    }

    fn monthly_bars_from(start_year: i32, closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: NaiveDate::from_ymd_opt(start_year + (i / 12) as i32, (i % 12) as u32 + 1, 1)
                    .unwrap(),
                close: Decimal::from_f64_retain(c).unwrap(),
            })
            .collect()
    }

    fn wiggly_closes(n: usize, amplitude: f64) -> Vec<f64> {
        let mut closes = vec![100.0];
        for i in 1..n {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let wobble = 1.0 + sign * amplitude * (1.0 + (i % 5) as f64 / 5.0);
            let prev = closes[i - 1];
            closes.push(prev * wobble);
        }
        closes
    }

    fn history_with(closes: &[f64]) -> InMemoryHistory {
        let mut history = InMemoryHistory::new();
        history.insert_monthly("TEST", monthly_bars(closes));
        history
    }

    fn asof() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    #[test]
    fn test_forecast_positive_and_finite() {
        let history = history_with(&wiggly_closes(36, 0.02));
        let forecaster = GarchForecaster::new(&history, GarchConfig {
            lookback_years: 3,
            ..Default::default()
        });

        let vol = forecaster.forecast("TEST", asof()).unwrap();
        assert!(vol.is_finite());
        assert!(vol > 0.0);
        assert!(vol < 1.0);
    }

    #[test]
    fn test_higher_variance_gives_higher_forecast() {
        let calm = history_with(&wiggly_closes(36, 0.01));
        let wild = history_with(&wiggly_closes(36, 0.04));
        let config = GarchConfig {
            lookback_years: 3,
            ..Default::default()
        };

        let low = GarchForecaster::new(&calm, config.clone())
            .forecast("TEST", asof())
            .unwrap();
        let high = GarchForecaster::new(&wild, config)
            .forecast("TEST", asof())
            .unwrap();
        assert!(high > low, "expected {} > {}", high, low);
    }

    #[test]
    fn test_flat_history_forecasts_zero() {
        // Bars must end at `asof` to fall inside the 2-year lookback window.
        let mut history = InMemoryHistory::new();
        history.insert_monthly("TEST", monthly_bars_from(2021, &vec![100.0; 24]));
        let forecaster = GarchForecaster::new(&history, GarchConfig {
            lookback_years: 2,
            innovation: Innovation::Normal,
            ..Default::default()
        });
        assert_eq!(forecaster.forecast("TEST", asof()).unwrap(), 0.0);
    }

    #[test]
    fn test_insufficient_history() {
        // Bars in the months directly preceding `asof`: inside the window,
        // but too few returns for a fit.
        let mut history = InMemoryHistory::new();
        history.insert_monthly("TEST", monthly_bars_from(2022, &wiggly_closes(6, 0.02)));
        let forecaster = GarchForecaster::new(&history, GarchConfig::default());
        assert!(matches!(
            forecaster.forecast("TEST", asof()),
            Err(ForecastError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn test_unsupported_order() {
        let history = history_with(&wiggly_closes(36, 0.02));
        let forecaster = GarchForecaster::new(&history, GarchConfig {
            p: 2,
            q: 1,
            ..Default::default()
        });
        assert!(matches!(
            forecaster.forecast("TEST", asof()),
            Err(ForecastError::UnsupportedOrder { p: 2, q: 1 })
        ));
    }

    #[test]
    fn test_lookback_start_handles_leap_day() {
        let leap = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            lookback_start(leap, 1),
            NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()
        );

        let plain = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
        assert_eq!(
            lookback_start(plain, 2),
            NaiveDate::from_ymd_opt(2021, 5, 1).unwrap()
        );
    }

    #[test]
    fn test_student_t_dof_bounds() {
        // Near-normal data pins to the upper clamp.
        let normalish: Vec<f64> = (0..100).map(|i| ((i % 7) as f64 - 3.0) / 3.0).collect();
        assert_eq!(student_t_dof(&normalish), 30.0);

        // A heavy outlier drives the estimate down.
        let mut fat = normalish.clone();
        fat[50] = 8.0;
        let nu = student_t_dof(&fat);
        assert!(nu < 30.0);
        assert!(nu >= 4.1);
    }

    #[test]
    fn test_fit_constraints() {
        let closes = wiggly_closes(48, 0.03);
        let returns: Vec<f64> = closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        let fit = fit_garch11(&returns, Innovation::Normal);

        assert!(fit.alpha > 0.0);
        assert!(fit.beta >= 0.0);
        assert!(fit.alpha + fit.beta < 1.0);
        assert!(fit.omega > 0.0);
        assert!(fit.forecast_variance(&returns) > 0.0);
    }
}
