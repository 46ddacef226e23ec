use super::{parse_provider_date, ProviderConfig};
use crate::currency_pair::CurrencyPair;
use crate::time_series::{DailyObservation, DateRange, FetchError, MarketDataProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.apilayer.com/exchangerates_data";

/// Exchange-rates timeseries client.
///
/// Takes base and quote ISO codes, sends the API key in the `apikey` header,
/// and answers with a `rates` object keyed by date.
#[derive(Debug)]
pub struct ExchangeRatesProvider {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    rates: BTreeMap<String, HashMap<String, f64>>,
}

impl ExchangeRatesProvider {
    /// Creates a new client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(config: ProviderConfig) -> Result<Self, FetchError> {
        let client = config.build_client()?;
        Ok(ExchangeRatesProvider { client, config })
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Decodes a timeseries payload, keeping the quote currency's rate per day.
    ///
    /// Days that lack a rate for `quote` are dropped.
    pub fn parse_rates(body: &str, quote: &str) -> Result<Vec<DailyObservation>, FetchError> {
        let response: TimeseriesResponse =
            serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

        if response.success == Some(false) {
            let message = response
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "request unsuccessful".to_string());
            return Err(FetchError::Api(message));
        }

        let mut observations = Vec::with_capacity(response.rates.len());
        for (day, quotes) in &response.rates {
            if let Some(rate) = quotes.get(quote) {
                observations.push(DailyObservation::from_rate(parse_provider_date(day)?, *rate));
            }
        }
        Ok(observations)
    }
}

#[async_trait]
impl MarketDataProvider for ExchangeRatesProvider {
    fn name(&self) -> &str {
        "exchangerates"
    }

    async fn fetch_daily_series(
        &self,
        pair: &CurrencyPair,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, FetchError> {
        if !range.is_valid() {
            return Err(FetchError::InvalidDateRange);
        }

        let (base, quote) = pair
            .base_quote()
            .ok_or_else(|| FetchError::UnsupportedCurrency(pair.to_string()))?;

        let url = format!("{}/timeseries", self.config.endpoint_root(DEFAULT_BASE_URL));
        let start = DateRange::format_date(range.start);
        let end = DateRange::format_date(range.end);

        debug!(currency = %pair, %base, %quote, %start, %end, "requesting exchange-rate series");

        let response = self
            .client
            .get(&url)
            .header("apikey", self.config.api_key.as_str())
            .query(&[
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
                ("base", base.as_str()),
                ("symbols", quote.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        Self::parse_rates(&body, &quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_rates_orders_by_date() {
        let body = r#"{
            "success": true,
            "timeseries": true,
            "base": "EUR",
            "rates": {
                "2024-01-03": {"USD": 1.0920},
                "2024-01-02": {"USD": 1.0940}
            }
        }"#;

        let observations = ExchangeRatesProvider::parse_rates(body, "USD").unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(observations[0].fields, vec![1.0940]);
        assert_eq!(observations[1].fields, vec![1.0920]);
    }

    #[test]
    fn test_parse_rates_skips_days_without_quote() {
        let body = r#"{"rates": {"2024-01-02": {"GBP": 0.86}, "2024-01-03": {"USD": 1.09}}}"#;
        let observations = ExchangeRatesProvider::parse_rates(body, "USD").unwrap();
        assert_eq!(observations.len(), 1);
    }

    #[test]
    fn test_parse_rates_unsuccessful_response() {
        let body = r#"{"success": false, "error": {"code": 101, "info": "invalid key"}}"#;
        let result = ExchangeRatesProvider::parse_rates(body, "USD");
        assert!(matches!(result, Err(FetchError::Api(msg)) if msg.contains("invalid key")));
    }

    #[test]
    fn test_parse_rates_missing_rates_is_empty() {
        let observations = ExchangeRatesProvider::parse_rates("{}", "USD").unwrap();
        assert!(observations.is_empty());
    }

    #[tokio::test]
    async fn test_non_iso_pair_rejected() {
        let provider = ExchangeRatesProvider::with_config(
            ProviderConfig::new("key").with_base_url("http://127.0.0.1:1"),
        )
        .unwrap();
        let pair = CurrencyPair::new("SPX500").unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );

        let result = provider.fetch_daily_series(&pair, &range).await;
        assert_eq!(result, Err(FetchError::UnsupportedCurrency("SPX500".to_string())));
    }
}
