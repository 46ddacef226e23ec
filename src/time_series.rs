use crate::currency_pair::CurrencyPair;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One trading day as returned by a market-data provider.
///
/// `fields` holds every numeric price field the provider reported for the day:
/// open/high/low/close for OHLC providers, or a single rate for providers that
/// already aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub fields: Vec<f64>,
}

impl DailyObservation {
    /// Creates a new observation.
    pub fn new(date: NaiveDate, fields: Vec<f64>) -> Self {
        DailyObservation { date, fields }
    }

    /// Creates an observation carrying a single already-aggregated rate.
    pub fn from_rate(date: NaiveDate, rate: f64) -> Self {
        DailyObservation {
            date,
            fields: vec![rate],
        }
    }

    /// Mean across the finite numeric fields of the day.
    ///
    /// Returns `None` when the day has no finite field at all.
    pub fn average(&self) -> Option<f64> {
        let finite: Vec<f64> = self.fields.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

/// Averaged price level for one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub level: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, level: f64) -> Self {
        PricePoint { date, level }
    }
}

/// First difference of the averaged level, dated by the later of the two days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl DiffPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        DiffPoint { date, value }
    }
}

/// Calendar date range, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start date (inclusive)
    pub start: NaiveDate,
    /// End date (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new DateRange.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Returns `true` when `start <= end`.
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Returns `true` when `date` falls inside the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Formats a date the way every provider and the store expect it.
    pub fn format_date(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }
}

/// Parses the leading `YYYY-MM-DD` of a date or timestamp string
/// ("2024-01-02", "2024-01-02T00:00:00Z").
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Capability shared by every upstream market-data source: fetch the daily
/// series of one currency pair over a date range.
///
/// Implementations:
/// - `TraderMadeProvider` (OHLC records, API key in the query string)
/// - `ExchangeRatesProvider` (rates map keyed by date, API key in a header)
/// - `InMemoryMarketData` (tests)
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Retrieves daily observations for `pair` over `range`.
    ///
    /// An empty vector means the provider had no data for the range; callers
    /// decide how to treat that.
    ///
    /// # Errors
    /// Returns a `FetchError` if the range is invalid, the pair is not accepted
    /// by the provider, the HTTP exchange fails, or the payload cannot be read.
    async fn fetch_daily_series(
        &self,
        pair: &CurrencyPair,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, FetchError>;
}

/// Errors that can occur when fetching a series from a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// HTTP client creation failed
    ClientCreation(String),
    /// Start date is after end date
    InvalidDateRange,
    /// Provider cannot serve this currency code
    UnsupportedCurrency(String),
    /// Transport-level failure (connect, timeout, TLS)
    Network(String),
    /// Provider answered with a non-success HTTP status
    Status(u16),
    /// Provider answered 2xx but reported an error in the body
    Api(String),
    /// Payload could not be decoded
    Parse(String),
}

impl FetchError {
    /// HTTP status of the failure, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::ClientCreation(msg) => write!(f, "Client creation error: {}", msg),
            FetchError::InvalidDateRange => write!(f, "Invalid date range"),
            FetchError::UnsupportedCurrency(code) => {
                write!(f, "Currency '{}' is not supported by the provider", code)
            }
            FetchError::Network(msg) => write!(f, "Network error: {}", msg),
            FetchError::Status(code) => write!(f, "HTTP status {}", code),
            FetchError::Api(msg) => write!(f, "API error: {}", msg),
            FetchError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// In-memory provider for tests and offline runs.
///
/// Series are keyed by pair code. A pair can also be primed to fail with a
/// fixed HTTP status.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    data: HashMap<String, Vec<DailyObservation>>,
    failures: HashMap<String, u16>,
}

impl InMemoryMarketData {
    /// Creates a new empty in-memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds observations for a pair, replacing any previous set.
    pub fn add_series(&mut self, pair: &CurrencyPair, observations: Vec<DailyObservation>) {
        self.data.insert(pair.as_str().to_string(), observations);
    }

    /// Makes every fetch for `pair` fail with the given HTTP status.
    pub fn fail_with_status(&mut self, pair: &CurrencyPair, status: u16) {
        self.failures.insert(pair.as_str().to_string(), status);
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryMarketData {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn fetch_daily_series(
        &self,
        pair: &CurrencyPair,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, FetchError> {
        if !range.is_valid() {
            return Err(FetchError::InvalidDateRange);
        }

        if let Some(status) = self.failures.get(pair.as_str()) {
            return Err(FetchError::Status(*status));
        }

        let observations = self
            .data
            .get(pair.as_str())
            .map(|all| {
                all.iter()
                    .filter(|obs| range.contains(obs.date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(observations)
    }
}
