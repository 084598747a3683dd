//! Closing-price history for underlyings.
//!
//! The backtest core consumes the [`PriceHistory`] trait: ordered daily or
//! monthly closes for a ticker over a date range. [`YahooClient`] fetches
//! bars from the Yahoo Finance chart endpoint; the binary prefetches into an
//! [`InMemoryHistory`] so the core stays synchronous and deterministic.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use super::types::PriceBar;

/// Chart endpoint base URL.
const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Minimum interval between requests.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(250);

/// Price-history errors.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No price data for {ticker} between {start} and {end}")]
    NoData {
        ticker: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// Ordered closing-price history source.
///
/// Both methods return bars sorted ascending by date, restricted to
/// `[start, end]` inclusive.
pub trait PriceHistory {
    fn daily_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, HistoryError>;

    fn monthly_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, HistoryError>;
}

// Chart API response shape: {"chart": {"result": [...], "error": ...}}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartPayload,
}

#[derive(Debug, Deserialize)]
struct ChartPayload {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    close: Option<Vec<Option<f64>>>,
}

/// Rate-limited HTTP client for the Yahoo Finance chart endpoint.
pub struct YahooClient {
    client: Client,
    last_request: Instant,
    request_count: u64,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            last_request: Instant::now() - MIN_REQUEST_INTERVAL,
            request_count: 0,
        }
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Daily closes in `[start, end]`.
    pub async fn daily_history(
        &mut self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, HistoryError> {
        self.chart(ticker, start, end, "1d").await
    }

    /// Month-end closes in `[start, end]`.
    pub async fn monthly_history(
        &mut self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, HistoryError> {
        self.chart(ticker, start, end, "1mo").await
    }

    async fn chart(
        &mut self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: &str,
    ) -> Result<Vec<PriceBar>, HistoryError> {
        // Rate limiting
        let elapsed = self.last_request.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
        }

        let period1 = unix_midnight(start).to_string();
        // period2 is exclusive; push one day past the end.
        let period2 = (unix_midnight(end) + 86_400).to_string();
        let params = [
            ("period1", period1.as_str()),
            ("period2", period2.as_str()),
            ("interval", interval),
            ("events", "history"),
        ];

        let url = format!("{}/{}", BASE_URL, ticker);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .header(reqwest::header::USER_AGENT, "lattice-backtest/0.1")
            .send()
            .await?;

        self.last_request = Instant::now();
        self.request_count += 1;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(HistoryError::InvalidResponse(format!("{}: {}", status, text)));
        }

        let parsed: ChartResponse = response
            .json()
            .await
            .map_err(|e| HistoryError::InvalidResponse(format!("bad chart payload: {}", e)))?;

        if let Some(err) = parsed.chart.error {
            return Err(HistoryError::InvalidResponse(format!(
                "{}: {}",
                err.code, err.description
            )));
        }

        let result = parsed
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| HistoryError::NoData {
                ticker: ticker.to_string(),
                start,
                end,
            })?;

        let timestamps = result.timestamp.unwrap_or_default();
        let closes = result
            .indicators
            .quote
            .first()
            .and_then(|q| q.close.clone())
            .unwrap_or_default();

        let mut bars: Vec<PriceBar> = timestamps
            .iter()
            .zip(closes.iter())
            .filter_map(|(&ts, close)| {
                let close = (*close)?;
                let date = DateTime::from_timestamp(ts, 0)?.date_naive();
                let close = Decimal::from_f64_retain(close)?;
                Some(PriceBar { date, close })
            })
            .filter(|bar| bar.date >= start && bar.date <= end)
            .collect();
        bars.sort_by_key(|b| b.date);

        if bars.is_empty() {
            return Err(HistoryError::NoData {
                ticker: ticker.to_string(),
                start,
                end,
            });
        }

        Ok(bars)
    }
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Prefetched price history held in memory for one backtest run.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    daily: HashMap<String, Vec<PriceBar>>,
    monthly: HashMap<String, Vec<PriceBar>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge daily bars for a ticker, deduplicating by date.
    pub fn insert_daily(&mut self, ticker: &str, bars: Vec<PriceBar>) {
        merge_bars(self.daily.entry(ticker.to_string()).or_default(), bars);
    }

    /// Merge monthly bars for a ticker, deduplicating by date.
    pub fn insert_monthly(&mut self, ticker: &str, bars: Vec<PriceBar>) {
        merge_bars(self.monthly.entry(ticker.to_string()).or_default(), bars);
    }

    fn slice(
        map: &HashMap<String, Vec<PriceBar>>,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, HistoryError> {
        let bars: Vec<PriceBar> = map
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        if bars.is_empty() {
            return Err(HistoryError::NoData {
                ticker: ticker.to_string(),
                start,
                end,
            });
        }
        Ok(bars)
    }
}

fn merge_bars(existing: &mut Vec<PriceBar>, bars: Vec<PriceBar>) {
    existing.extend(bars);
    existing.sort_by_key(|b| b.date);
    existing.dedup_by_key(|b| b.date);
}

impl PriceHistory for InMemoryHistory {
    fn daily_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, HistoryError> {
        Self::slice(&self.daily, ticker, start, end)
    }

    fn monthly_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, HistoryError> {
        Self::slice(&self.monthly, ticker, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(date: &str, close: Decimal) -> PriceBar {
        PriceBar {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            close,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_in_memory_range_filter() {
        let mut history = InMemoryHistory::new();
        history.insert_daily(
            "AAPL",
            vec![
                bar("2023-05-01", dec!(170)),
                bar("2023-05-02", dec!(171)),
                bar("2023-05-03", dec!(169)),
            ],
        );

        let bars = history
            .daily_closes("AAPL", date("2023-05-02"), date("2023-05-03"))
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, dec!(171));
    }

    #[test]
    fn test_in_memory_merge_dedup() {
        let mut history = InMemoryHistory::new();
        history.insert_daily("AAPL", vec![bar("2023-05-02", dec!(171))]);
        history.insert_daily(
            "AAPL",
            vec![bar("2023-05-01", dec!(170)), bar("2023-05-02", dec!(171))],
        );

        let bars = history
            .daily_closes("AAPL", date("2023-05-01"), date("2023-05-31"))
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, date("2023-05-01"));
    }

    #[test]
    fn test_in_memory_no_data() {
        let history = InMemoryHistory::new();
        assert!(matches!(
            history.daily_closes("AAPL", date("2023-05-01"), date("2023-05-31")),
            Err(HistoryError::NoData { .. })
        ));
    }

    #[test]
    fn test_unix_midnight() {
        assert_eq!(unix_midnight(date("1970-01-02")), 86_400);
    }
}
