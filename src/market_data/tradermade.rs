use super::{parse_provider_date, ProviderConfig};
use crate::currency_pair::CurrencyPair;
use crate::time_series::{DailyObservation, DateRange, FetchError, MarketDataProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://marketdata.tradermade.com";

/// TraderMade timeseries client.
///
/// Requests `/api/v1/pandasDF` in `records` format with OHLC fields; each
/// record carries a `date` plus the numeric price fields.
#[derive(Debug)]
pub struct TraderMadeProvider {
    client: Client,
    config: ProviderConfig,
}

impl TraderMadeProvider {
    /// Creates a new client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(config: ProviderConfig) -> Result<Self, FetchError> {
        let client = config.build_client()?;
        Ok(TraderMadeProvider { client, config })
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Decodes a `records` payload into daily observations.
    ///
    /// Every numeric field other than `date` is kept, so the daily average
    /// spans whatever price columns the provider returned.
    pub fn parse_records(body: &Value) -> Result<Vec<DailyObservation>, FetchError> {
        let records = match body {
            Value::Array(records) => records,
            Value::Object(map) => {
                let message = map
                    .get("message")
                    .or_else(|| map.get("error"))
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "unexpected object payload".to_string());
                return Err(FetchError::Api(message));
            }
            other => return Err(FetchError::Parse(format!("expected array, got {}", other))),
        };

        records
            .iter()
            .map(|record| {
                let fields = record
                    .as_object()
                    .ok_or_else(|| FetchError::Parse("record is not an object".to_string()))?;
                let date = fields
                    .get("date")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FetchError::Parse("record without date".to_string()))?;
                let values = fields
                    .iter()
                    .filter(|(name, _)| name.as_str() != "date")
                    .filter_map(|(_, value)| value.as_f64())
                    .collect();
                Ok(DailyObservation::new(parse_provider_date(date)?, values))
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for TraderMadeProvider {
    fn name(&self) -> &str {
        "tradermade"
    }

    async fn fetch_daily_series(
        &self,
        pair: &CurrencyPair,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, FetchError> {
        if !range.is_valid() {
            return Err(FetchError::InvalidDateRange);
        }

        let url = format!(
            "{}/api/v1/pandasDF",
            self.config.endpoint_root(DEFAULT_BASE_URL)
        );
        let start = DateRange::format_date(range.start);
        let end = DateRange::format_date(range.end);

        debug!(currency = %pair, %start, %end, "requesting TraderMade series");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("currency", pair.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
                ("format", "records"),
                ("fields", "ohlc"),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        Self::parse_records(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_parse_records_keeps_numeric_fields() {
        let body = json!([
            {"date": "2024-01-02", "open": 1.10, "high": 1.12, "low": 1.08, "close": 1.10},
            {"date": "2024-01-03", "open": 1.11, "high": null, "low": 1.09, "close": 1.10}
        ]);

        let observations = TraderMadeProvider::parse_records(&body).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(observations[0].fields.len(), 4);
        assert_eq!(observations[1].fields.len(), 3);
        assert!((observations[0].average().unwrap() - 1.10).abs() < 1e-12);
    }

    #[test]
    fn test_parse_records_empty_array() {
        let observations = TraderMadeProvider::parse_records(&json!([])).unwrap();
        assert!(observations.is_empty());
    }

    #[test]
    fn test_parse_records_error_object() {
        let body = json!({"message": "Invalid API key"});
        let result = TraderMadeProvider::parse_records(&body);
        assert!(matches!(result, Err(FetchError::Api(msg)) if msg.contains("Invalid API key")));
    }

    #[test]
    fn test_parse_records_missing_date() {
        let body = json!([{"close": 1.0}]);
        assert!(matches!(
            TraderMadeProvider::parse_records(&body),
            Err(FetchError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_range_rejected_before_request() {
        let provider = TraderMadeProvider::with_config(
            ProviderConfig::new("key").with_base_url("http://127.0.0.1:1"),
        )
        .unwrap();
        let pair = CurrencyPair::new("EURUSD").unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );

        let result = provider.fetch_daily_series(&pair, &range).await;
        assert_eq!(result, Err(FetchError::InvalidDateRange));
    }
}
