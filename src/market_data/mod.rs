//! Market-data provider clients
//!
//! Two upstream sources are supported behind the `MarketDataProvider` trait:
//! TraderMade (OHLC records) and an exchange-rates timeseries API (one rate
//! per day). The active one is chosen by configuration.

mod exchange_rates;
mod tradermade;

pub use exchange_rates::ExchangeRatesProvider;
pub use tradermade::TraderMadeProvider;

use crate::time_series::{parse_iso_date, FetchError, MarketDataProvider};
use reqwest::Client;
use std::str::FromStr;
use std::time::Duration;

/// Configuration shared by the HTTP providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key sent with every request
    pub api_key: String,
    /// Endpoint root; `None` uses the provider's public endpoint
    pub base_url: Option<String>,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
}

impl ProviderConfig {
    /// Creates a configuration with the default endpoint and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        ProviderConfig {
            api_key: api_key.into(),
            base_url: None,
            timeout_seconds: 30,
        }
    }

    /// Overrides the endpoint root (used against mirrors and mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub(crate) fn build_client(&self) -> Result<Client, FetchError> {
        Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .build()
            .map_err(|e| FetchError::ClientCreation(e.to_string()))
    }

    pub(crate) fn endpoint_root(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Which upstream provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    TraderMade,
    ExchangeRates,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tradermade" => Ok(ProviderKind::TraderMade),
            "exchangerates" | "exchange_rates" | "apilayer" => Ok(ProviderKind::ExchangeRates),
            other => Err(format!("unknown market-data provider '{}'", other)),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::TraderMade => write!(f, "tradermade"),
            ProviderKind::ExchangeRates => write!(f, "exchangerates"),
        }
    }
}

/// Builds the configured provider.
///
/// # Errors
/// Returns `FetchError::ClientCreation` if the HTTP client cannot be built.
pub fn build_provider(
    kind: ProviderKind,
    config: ProviderConfig,
) -> Result<Box<dyn MarketDataProvider>, FetchError> {
    Ok(match kind {
        ProviderKind::TraderMade => Box::new(TraderMadeProvider::with_config(config)?),
        ProviderKind::ExchangeRates => Box::new(ExchangeRatesProvider::with_config(config)?),
    })
}

pub(crate) fn parse_provider_date(raw: &str) -> Result<chrono::NaiveDate, FetchError> {
    parse_iso_date(raw).ok_or_else(|| FetchError::Parse(format!("invalid date '{}'", raw)))
}
