pub mod currency_pair;
pub mod time_series;
pub mod market_data;
pub mod preparation;
pub mod arima;
pub mod evaluation;
pub mod reconstruction;
pub mod store;
pub mod pipeline;
pub mod service;
pub mod server;
pub mod config;


pub use currency_pair::{CurrencyPair, CurrencyPairError};
pub use time_series::{
    DailyObservation, DateRange, DiffPoint, FetchError, InMemoryMarketData, MarketDataProvider,
    PricePoint,
};
pub use market_data::{
    build_provider, ExchangeRatesProvider, ProviderConfig, ProviderKind, TraderMadeProvider,
};
pub use preparation::{prepare, split_index, PrepareError, PreparedSeries};
pub use arima::{ArimaModel, ArimaOrder, ModelError, ModelFit};
pub use evaluation::{evaluate, EvaluationError, ForecastMetrics};
pub use reconstruction::reconstruct;
pub use store::{
    ForecastPoint, ForecastRequest, ForecastStore, RestStore, RestStoreConfig, SqliteStore,
    StoreError,
};
pub use pipeline::{
    FailureKind, ForecastPipeline, PipelineError, PipelineOutcome, PipelineSettings,
    SeriesForecast,
};
pub use service::{BatchReport, ForecastService, PollState, SkippedRequest};
pub use server::{
    create_router, run_liveness, spawn_liveness, watch_liveness, LivenessConfig, LivenessExit,
};
pub use config::{Config, ConfigError, StoreBackend};
