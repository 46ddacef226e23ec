use super::{ForecastPoint, ForecastRequest, ForecastStore, StoreError, FORECAST_TABLE, REQUESTS_TABLE};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestStoreConfig {
    /// Project URL, e.g. `https://<project>.supabase.co`
    pub base_url: String,
    /// Access key, sent both as `apikey` and as bearer token
    pub api_key: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
}

impl RestStoreConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        RestStoreConfig {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_seconds: 30,
        }
    }
}

/// Store backed by a PostgREST endpoint (`/rest/v1/<table>`).
#[derive(Debug)]
pub struct RestStore {
    client: Client,
    config: RestStoreConfig,
}

impl RestStore {
    /// Creates a new store client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StoreError::ClientCreation(e.to_string()))?;
        Ok(RestStore { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", self.config.api_key.as_str())
            .bearer_auth(&self.config.api_key)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Vec<T>, StoreError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ForecastStore for RestStore {
    async fn pending_requests(&self) -> Result<Vec<ForecastRequest>, StoreError> {
        let request = self.client.get(self.table_url(REQUESTS_TABLE)).query(&[
            ("select", "*"),
            // matches false and null
            ("processed", "not.is.true"),
            ("order", "id.asc"),
        ]);
        self.fetch_rows(request).await
    }

    async fn delete_forecast(&self, currency: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .delete(self.table_url(FORECAST_TABLE))
            .query(&[("currency", format!("eq.{}", currency))]);
        self.send(request).await?;
        Ok(())
    }

    async fn insert_forecast(&self, points: &[ForecastPoint]) -> Result<(), StoreError> {
        let request = self
            .client
            .post(self.table_url(FORECAST_TABLE))
            .header("Prefer", "return=minimal")
            .json(points);
        self.send(request).await?;
        Ok(())
    }

    async fn mark_processed(&self, id: i64) -> Result<(), StoreError> {
        let request = self
            .client
            .patch(self.table_url(REQUESTS_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "processed": true }));
        self.send(request).await?;
        Ok(())
    }

    async fn forecast_for(&self, currency: &str) -> Result<Vec<ForecastPoint>, StoreError> {
        let request = self.client.get(self.table_url(FORECAST_TABLE)).query(&[
            ("select", "currency,date,value".to_string()),
            ("currency", format!("eq.{}", currency)),
            ("order", "date.asc".to_string()),
        ]);
        self.fetch_rows(request).await
    }
}
