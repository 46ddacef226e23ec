//! Request intake and forecast persistence
//!
//! Requests are read from the `UserInputs` table and forecasts are written to
//! `forecast_results`. Two backends share the same schema: the hosted
//! PostgREST backend and a local SQLite database.

mod rest;
mod sqlite;

pub use rest::{RestStore, RestStoreConfig};
pub use sqlite::SqliteStore;

use crate::time_series::{parse_iso_date, DateRange, PricePoint};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Table holding incoming forecast requests.
pub const REQUESTS_TABLE: &str = "UserInputs";
/// Table holding forecast rows.
pub const FORECAST_TABLE: &str = "forecast_results";

/// A pending forecast request as stored by the upstream system.
///
/// Dates are kept as submitted and parsed on demand so that one malformed row
/// cannot prevent the rest of a batch from being read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub id: i64,
    pub currency: String,
    #[serde(rename = "startdate")]
    pub start_date: String,
    #[serde(rename = "enddate")]
    pub end_date: String,
    /// Missing or `null` reads as not yet processed
    #[serde(default, deserialize_with = "null_as_false")]
    pub processed: bool,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl ForecastRequest {
    /// Parses the requested date range.
    ///
    /// Returns `None` if either date is not an ISO date.
    pub fn date_range(&self) -> Option<DateRange> {
        Some(DateRange::new(
            parse_iso_date(&self.start_date)?,
            parse_iso_date(&self.end_date)?,
        ))
    }
}

/// One stored forecast row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub currency: String,
    /// Serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
    pub value: f64,
}

impl ForecastPoint {
    pub fn new(currency: impl Into<String>, date: NaiveDate, value: f64) -> Self {
        ForecastPoint {
            currency: currency.into(),
            date,
            value,
        }
    }

    /// Builds the rows for one currency from reconstructed levels.
    pub fn from_levels(currency: &str, levels: &[PricePoint]) -> Vec<ForecastPoint> {
        levels
            .iter()
            .map(|p| ForecastPoint::new(currency, p.date, p.level))
            .collect()
    }
}

/// Errors raised by a store backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// HTTP client creation failed
    ClientCreation(String),
    /// Transport-level failure
    Network(String),
    /// Backend answered with a non-success HTTP status
    Status { status: u16, body: String },
    /// Response could not be decoded
    Parse(String),
    /// Local database error
    Database(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ClientCreation(msg) => write!(f, "Client creation error: {}", msg),
            StoreError::Network(msg) => write!(f, "Network error: {}", msg),
            StoreError::Status { status, body } => {
                write!(f, "Backend returned HTTP {}: {}", status, body)
            }
            StoreError::Parse(msg) => write!(f, "Parse error: {}", msg),
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Read/write access to requests and forecasts.
///
/// Forecast replacement is two separate steps (delete, then insert) with no
/// atomicity across them; a request is only marked processed after both
/// succeed, so a failure in between leads to a full rewrite on the next poll.
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Requests whose `processed` flag is false, ordered by id.
    async fn pending_requests(&self) -> Result<Vec<ForecastRequest>, StoreError>;

    /// Deletes every forecast row for `currency`.
    async fn delete_forecast(&self, currency: &str) -> Result<(), StoreError>;

    /// Inserts forecast rows.
    async fn insert_forecast(&self, points: &[ForecastPoint]) -> Result<(), StoreError>;

    /// Sets `processed = true` on the request with `id`.
    async fn mark_processed(&self, id: i64) -> Result<(), StoreError>;

    /// Current forecast rows for `currency`, ascending by date.
    async fn forecast_for(&self, currency: &str) -> Result<Vec<ForecastPoint>, StoreError>;

    /// Deletes then inserts, so that `currency` ends up with exactly `points`.
    async fn replace_forecast(
        &self,
        currency: &str,
        points: &[ForecastPoint],
    ) -> Result<(), StoreError> {
        self.delete_forecast(currency).await?;
        if points.is_empty() {
            return Ok(());
        }
        self.insert_forecast(points).await
    }
}
