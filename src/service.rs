//! Poll loop
//!
//! Reads pending requests, runs each through the pipeline strictly in order,
//! sleeps, repeats. A failed request is logged and skipped; a failed poll is
//! logged and retried after the interval.

use crate::pipeline::{FailureKind, ForecastPipeline, PipelineError, PipelineOutcome};
use crate::store::StoreError;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default sleep between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Waiting for the next poll
    Idle,
    /// Working through a batch of pending requests
    Processing,
}

/// Request that was skipped during a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRequest {
    pub request_id: i64,
    pub error: PipelineError,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Requests that were forecast and marked processed
    pub processed: Vec<PipelineOutcome>,
    /// Requests left unprocessed, with the reason
    pub skipped: Vec<SkippedRequest>,
}

impl BatchReport {
    /// Number of requests seen in the batch.
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Skip counts per failure kind.
    pub fn skipped_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for skipped in &self.skipped {
            *counts.entry(skipped.error.kind()).or_insert(0) += 1;
        }
        counts
    }

    fn record(&mut self, request_id: i64, result: Result<PipelineOutcome, PipelineError>) {
        match result {
            Ok(outcome) => self.processed.push(outcome),
            Err(error) => {
                warn!(
                    request_id,
                    currency = error.currency(),
                    kind = %error.kind(),
                    "Skipping request: {}",
                    error
                );
                self.skipped.push(SkippedRequest { request_id, error });
            }
        }
    }
}

/// Long-running service around a `ForecastPipeline`.
pub struct ForecastService {
    pipeline: ForecastPipeline,
    poll_interval: Duration,
    state: PollState,
}

impl ForecastService {
    pub fn new(pipeline: ForecastPipeline) -> Self {
        ForecastService {
            pipeline,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: PollState::Idle,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Runs one poll cycle: every currently pending request, in id order.
    ///
    /// # Errors
    /// Returns the store error if the pending requests cannot be read. Errors
    /// of individual requests are recorded in the report instead.
    pub async fn run_once(&mut self) -> Result<BatchReport, StoreError> {
        let pending = self.pipeline.store().pending_requests().await?;
        let mut report = BatchReport::default();

        if pending.is_empty() {
            info!("No new inputs found.");
            return Ok(report);
        }

        self.state = PollState::Processing;
        info!(count = pending.len(), "Processing pending requests");

        for request in &pending {
            let result = self.pipeline.process(request).await;
            report.record(request.id, result);
        }

        self.state = PollState::Idle;
        info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Polls until `shutdown` resolves.
    ///
    /// A cycle that fails as a whole is logged and the loop carries on after
    /// the usual interval.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            interval_secs = self.poll_interval.as_secs(),
            provider = self.pipeline.provider_name(),
            "Forecast service started"
        );

        loop {
            if let Err(e) = self.run_once().await {
                self.state = PollState::Idle;
                error!("Poll cycle failed: {}", e);
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Forecast service stopping");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Polls forever.
    pub async fn run_forever(&mut self) {
        self.run_until(std::future::pending()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency_pair::CurrencyPair;
    use crate::pipeline::PipelineSettings;
    use crate::store::{ForecastStore, SqliteStore};
    use crate::time_series::{DailyObservation, InMemoryMarketData};
    use chrono::{Duration as Days, NaiveDate};
    use std::sync::Arc;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn service_with(provider: InMemoryMarketData, store: Arc<SqliteStore>) -> ForecastService {
        let pipeline =
            ForecastPipeline::new(Arc::new(provider), store, PipelineSettings::default()).unwrap();
        ForecastService::new(pipeline).with_poll_interval(Duration::from_millis(10))
    }

    fn rising(days: i64) -> Vec<DailyObservation> {
        (0..days)
            .map(|i| DailyObservation::from_rate(date(1) + Days::days(i), 1.2 + 0.002 * i as f64))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_poll_stays_idle() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let mut service = service_with(InMemoryMarketData::new(), store);

        let report = service.run_once().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(service.state(), PollState::Idle);
    }

    #[tokio::test]
    async fn test_bad_request_does_not_stop_batch() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store.submit_request("USDJPY", date(1), date(20)).unwrap();
        store.submit_request("GBPUSD", date(1), date(20)).unwrap();
        store.submit_request("EURUSD", date(1), date(20)).unwrap();

        let mut provider = InMemoryMarketData::new();
        provider.fail_with_status(&CurrencyPair::new("USDJPY").unwrap(), 500);
        provider.add_series(&CurrencyPair::new("EURUSD").unwrap(), rising(20));
        let mut service = service_with(provider, store.clone());

        let report = service.run_once().await.unwrap();
        assert_eq!(report.total(), 3);
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].currency, "EURUSD");

        let kinds = report.skipped_by_kind();
        assert_eq!(kinds.get(&FailureKind::FetchFailed), Some(&1));
        assert_eq!(kinds.get(&FailureKind::EmptyResult), Some(&1));
        assert_eq!(service.state(), PollState::Idle);

        let pending: Vec<String> = store
            .pending_requests()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.currency)
            .collect();
        assert_eq!(pending, vec!["USDJPY".to_string(), "GBPUSD".to_string()]);
    }

    #[tokio::test]
    async fn test_processed_requests_are_not_polled_again() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store.submit_request("EURUSD", date(1), date(20)).unwrap();
        let mut provider = InMemoryMarketData::new();
        provider.add_series(&CurrencyPair::new("EURUSD").unwrap(), rising(20));
        let mut service = service_with(provider, store);

        assert_eq!(service.run_once().await.unwrap().processed.len(), 1);
        assert!(service.run_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store.submit_request("EURUSD", date(1), date(20)).unwrap();
        let mut provider = InMemoryMarketData::new();
        provider.add_series(&CurrencyPair::new("EURUSD").unwrap(), rising(20));
        let mut service = service_with(provider, store.clone());

        service
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert!(store.pending_requests().await.unwrap().is_empty());
        assert_eq!(store.forecast_for("EURUSD").await.unwrap().len(), 4);
    }
}
