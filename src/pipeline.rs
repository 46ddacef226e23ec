//! Per-request forecasting pipeline
//!
//! One request flows through fetch, preparation, model fit, evaluation,
//! reconstruction and persistence. Every failure is returned as a
//! `PipelineError` tagged with the request's currency; nothing is written to
//! the store unless the forecast was produced in full.

use crate::arima::{ArimaModel, ArimaOrder, ModelError};
use crate::currency_pair::CurrencyPair;
use crate::evaluation::{evaluate, EvaluationError, ForecastMetrics};
use crate::preparation::{prepare, PrepareError, DEFAULT_TEST_RATIO};
use crate::reconstruction::reconstruct;
use crate::store::{ForecastPoint, ForecastRequest, ForecastStore};
use crate::time_series::{DailyObservation, DiffPoint, FetchError, MarketDataProvider};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Category of a pipeline failure, used for batch reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    FetchFailed,
    EmptyResult,
    InsufficientData,
    ModelFitFailed,
    ShapeMismatch,
    StoreFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::FetchFailed => "FetchFailed",
            FailureKind::EmptyResult => "EmptyResult",
            FailureKind::InsufficientData => "InsufficientData",
            FailureKind::ModelFitFailed => "ModelFitFailed",
            FailureKind::ShapeMismatch => "ShapeMismatch",
            FailureKind::StoreFailed => "StoreFailed",
        };
        write!(f, "{}", name)
    }
}

/// Reason a request was skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Request could not be fetched: invalid input, transport error or non-2xx
    FetchFailed {
        currency: String,
        status: Option<u16>,
        reason: String,
    },
    /// Provider returned no rows for the range
    EmptyResult { currency: String },
    /// Series too short to fill both partitions or to fit the model
    InsufficientData { currency: String, reason: String },
    /// Model could not be fitted
    ModelFitFailed { currency: String, reason: String },
    /// Prediction count differs from the test partition
    ShapeMismatch {
        currency: String,
        actual: usize,
        predicted: usize,
    },
    /// Delete, insert or mark-processed failed
    StoreFailed { currency: String, reason: String },
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::FetchFailed { .. } => FailureKind::FetchFailed,
            PipelineError::EmptyResult { .. } => FailureKind::EmptyResult,
            PipelineError::InsufficientData { .. } => FailureKind::InsufficientData,
            PipelineError::ModelFitFailed { .. } => FailureKind::ModelFitFailed,
            PipelineError::ShapeMismatch { .. } => FailureKind::ShapeMismatch,
            PipelineError::StoreFailed { .. } => FailureKind::StoreFailed,
        }
    }

    /// Currency of the request that failed.
    pub fn currency(&self) -> &str {
        match self {
            PipelineError::FetchFailed { currency, .. }
            | PipelineError::EmptyResult { currency }
            | PipelineError::InsufficientData { currency, .. }
            | PipelineError::ModelFitFailed { currency, .. }
            | PipelineError::ShapeMismatch { currency, .. }
            | PipelineError::StoreFailed { currency, .. } => currency,
        }
    }

    fn fetch(currency: &str, err: FetchError) -> Self {
        PipelineError::FetchFailed {
            currency: currency.to_string(),
            status: err.status(),
            reason: err.to_string(),
        }
    }

    fn model(currency: &str, err: ModelError) -> Self {
        match err {
            ModelError::TooFewObservations { .. } => PipelineError::InsufficientData {
                currency: currency.to_string(),
                reason: err.to_string(),
            },
            other => PipelineError::ModelFitFailed {
                currency: currency.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::FetchFailed {
                currency,
                status: Some(code),
                ..
            } => write!(f, "FetchFailed({}, HTTP {})", currency, code),
            PipelineError::FetchFailed {
                currency, reason, ..
            } => write!(f, "FetchFailed({}): {}", currency, reason),
            PipelineError::EmptyResult { currency } => write!(f, "EmptyResult({})", currency),
            PipelineError::InsufficientData { currency, reason } => {
                write!(f, "InsufficientData({}): {}", currency, reason)
            }
            PipelineError::ModelFitFailed { currency, reason } => {
                write!(f, "ModelFitFailed({}): {}", currency, reason)
            }
            PipelineError::ShapeMismatch {
                currency,
                actual,
                predicted,
            } => write!(
                f,
                "ShapeMismatch({}): {} test values vs {} predictions",
                currency, actual, predicted
            ),
            PipelineError::StoreFailed { currency, reason } => {
                write!(f, "StoreFailed({}): {}", currency, reason)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Model settings applied to every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub order: ArimaOrder,
    pub test_ratio: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            order: ArimaOrder::default(),
            test_ratio: DEFAULT_TEST_RATIO,
        }
    }
}

/// Forecast for one currency, before it is written anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesForecast {
    /// Predicted differences, dated like the test partition
    pub predicted: Vec<DiffPoint>,
    /// Held-out differences the predictions are scored against
    pub actual: Vec<DiffPoint>,
    /// Level the reconstruction is anchored on
    pub last_level: f64,
    /// Reconstructed absolute levels
    pub points: Vec<ForecastPoint>,
    /// `None` only if scoring was impossible
    pub metrics: Option<ForecastMetrics>,
}

/// Result of a fully handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub request_id: i64,
    pub currency: String,
    pub forecast: SeriesForecast,
}

/// Runs requests against an injected provider and store.
pub struct ForecastPipeline {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn ForecastStore>,
    model: ArimaModel,
    test_ratio: f64,
}

impl ForecastPipeline {
    /// Creates a pipeline.
    ///
    /// # Errors
    /// Returns `ModelError::InvalidOrder` if the configured order is unsupported.
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn ForecastStore>,
        settings: PipelineSettings,
    ) -> Result<Self, ModelError> {
        Ok(ForecastPipeline {
            provider,
            store,
            model: ArimaModel::new(settings.order)?,
            test_ratio: settings.test_ratio,
        })
    }

    /// Replaces the model, keeping its order and optimiser settings as given.
    pub fn with_model(mut self, model: ArimaModel) -> Self {
        self.model = model;
        self
    }

    pub fn store(&self) -> &Arc<dyn ForecastStore> {
        &self.store
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Handles one request end to end.
    ///
    /// On success the currency's forecast rows have been replaced and the
    /// request is marked processed. On any error the request stays
    /// unprocessed.
    pub async fn process(&self, request: &ForecastRequest) -> Result<PipelineOutcome, PipelineError> {
        let currency = request.currency.as_str();
        info!(
            request_id = request.id,
            "Processing: {} from {} to {}", currency, request.start_date, request.end_date
        );

        let pair = CurrencyPair::new(currency).map_err(|e| PipelineError::FetchFailed {
            currency: currency.to_string(),
            status: None,
            reason: e.to_string(),
        })?;
        let range = request.date_range().ok_or_else(|| PipelineError::FetchFailed {
            currency: currency.to_string(),
            status: None,
            reason: format!(
                "unparsable date range '{}'..'{}'",
                request.start_date, request.end_date
            ),
        })?;
        if !range.is_valid() {
            return Err(PipelineError::fetch(currency, FetchError::InvalidDateRange));
        }

        let observations = self
            .provider
            .fetch_daily_series(&pair, &range)
            .await
            .map_err(|e| PipelineError::fetch(currency, e))?;
        debug!(currency, rows = observations.len(), provider = self.provider.name(), "Fetched series");

        let forecast = self.forecast_series(currency, &observations)?;

        let store_err = |e: crate::store::StoreError| PipelineError::StoreFailed {
            currency: currency.to_string(),
            reason: e.to_string(),
        };
        self.store
            .replace_forecast(currency, &forecast.points)
            .await
            .map_err(store_err)?;
        info!(currency, rows = forecast.points.len(), "Forecast for {} overwritten", currency);

        self.store.mark_processed(request.id).await.map_err(store_err)?;
        info!(request_id = request.id, "Input marked as processed for {}.", currency);

        Ok(PipelineOutcome {
            request_id: request.id,
            currency: currency.to_string(),
            forecast,
        })
    }

    /// Prepares, fits, scores and reconstructs a fetched series.
    ///
    /// Touches neither the provider nor the store.
    pub fn forecast_series(
        &self,
        currency: &str,
        observations: &[DailyObservation],
    ) -> Result<SeriesForecast, PipelineError> {
        if observations.is_empty() {
            return Err(PipelineError::EmptyResult {
                currency: currency.to_string(),
            });
        }

        let prepared = prepare(observations, self.test_ratio).map_err(|e| match e {
            PrepareError::NoUsableRows => PipelineError::EmptyResult {
                currency: currency.to_string(),
            },
            PrepareError::InsufficientData { .. } => PipelineError::InsufficientData {
                currency: currency.to_string(),
                reason: e.to_string(),
            },
        })?;

        let fit = self
            .model
            .fit(&prepared.train_values())
            .map_err(|e| PipelineError::model(currency, e))?;
        debug!(
            currency,
            order = %fit.order(),
            constant = fit.constant(),
            sigma2 = fit.sigma2(),
            aic = fit.aic(),
            iterations = fit.iterations(),
            "Model fitted"
        );

        let predictions = fit.forecast(prepared.test.len());
        if predictions.len() != prepared.test.len() {
            return Err(PipelineError::ShapeMismatch {
                currency: currency.to_string(),
                actual: prepared.test.len(),
                predicted: predictions.len(),
            });
        }
        if predictions.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::ModelFitFailed {
                currency: currency.to_string(),
                reason: "non-finite forecast".to_string(),
            });
        }

        let predicted: Vec<DiffPoint> = prepared
            .test
            .iter()
            .zip(&predictions)
            .map(|(actual, value)| DiffPoint::new(actual.date, *value))
            .collect();

        let metrics = match evaluate(&prepared.test_values(), &predictions) {
            Ok(metrics) => {
                info!(
                    currency,
                    mae = metrics.mae,
                    mse = metrics.mse,
                    rmse = metrics.rmse,
                    "Forecast performance"
                );
                Some(metrics)
            }
            Err(EvaluationError::ShapeMismatch { actual, predicted }) => {
                return Err(PipelineError::ShapeMismatch {
                    currency: currency.to_string(),
                    actual,
                    predicted,
                });
            }
            Err(EvaluationError::Empty) => {
                warn!(currency, "Nothing to score the forecast against");
                None
            }
        };

        let last_level = prepared.last_level();
        let levels = reconstruct(last_level, &predicted);

        Ok(SeriesForecast {
            predicted,
            actual: prepared.test,
            last_level,
            points: ForecastPoint::from_levels(currency, &levels),
            metrics,
        })
    }
}
