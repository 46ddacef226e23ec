//! Startup configuration read from the environment

use crate::arima::ArimaOrder;
use crate::market_data::{ProviderConfig, ProviderKind};
use crate::pipeline::PipelineSettings;
use crate::preparation::DEFAULT_TEST_RATIO;
use crate::server::LivenessConfig;
use crate::service::DEFAULT_POLL_INTERVAL;
use crate::store::RestStoreConfig;
use std::time::Duration;

/// Where forecasts and requests live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Hosted PostgREST backend
    Rest(RestStoreConfig),
    /// Local SQLite file
    Sqlite { path: String },
}

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    Missing(&'static str),
    /// A variable is set but cannot be parsed
    Invalid { name: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(name) => {
                write!(f, "Missing required environment variable {}", name)
            }
            ConfigError::Invalid { name, reason } => write!(f, "Invalid {}: {}", name, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store: StoreBackend,
    pub provider: ProviderKind,
    pub market_data_api_key: String,
    pub market_data_base_url: Option<String>,
    pub order: ArimaOrder,
    pub test_ratio: f64,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub liveness: LivenessConfig,
}

impl Config {
    /// Reads the process environment.
    ///
    /// # Errors
    /// Returns a `ConfigError` naming the first missing or malformed variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which returns a variable's value.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(*name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let http_timeout = Duration::from_secs(match get(&["HTTP_TIMEOUT_SECS"]) {
            Some(raw) => parse(&raw, "HTTP_TIMEOUT_SECS")?,
            None => 30,
        });

        let store = match get(&["DATABASE_PATH"]) {
            Some(path) => StoreBackend::Sqlite { path },
            None => {
                let url = get(&["BACKEND_URL", "SUPABASE_URL"])
                    .ok_or(ConfigError::Missing("BACKEND_URL"))?;
                let key = get(&["BACKEND_KEY", "SUPABASE_KEY"])
                    .ok_or(ConfigError::Missing("BACKEND_KEY"))?;
                let mut rest = RestStoreConfig::new(url, key);
                rest.timeout_seconds = http_timeout.as_secs();
                StoreBackend::Rest(rest)
            }
        };

        let market_data_api_key = get(&["MARKET_DATA_API_KEY", "API_KEY"])
            .ok_or(ConfigError::Missing("MARKET_DATA_API_KEY"))?;

        let provider = match get(&["MARKET_DATA_PROVIDER"]) {
            Some(raw) => raw.parse::<ProviderKind>().map_err(|reason| ConfigError::Invalid {
                name: "MARKET_DATA_PROVIDER",
                reason,
            })?,
            None => ProviderKind::TraderMade,
        };

        let order = match get(&["ARIMA_ORDER"]) {
            Some(raw) => raw.parse::<ArimaOrder>().map_err(|e| ConfigError::Invalid {
                name: "ARIMA_ORDER",
                reason: e.to_string(),
            })?,
            None => ArimaOrder::default(),
        };

        let test_ratio = match get(&["TEST_RATIO"]) {
            Some(raw) => {
                let ratio: f64 = parse(&raw, "TEST_RATIO")?;
                if !(ratio > 0.0 && ratio < 1.0) {
                    return Err(ConfigError::Invalid {
                        name: "TEST_RATIO",
                        reason: format!("{} is not between 0 and 1", ratio),
                    });
                }
                ratio
            }
            None => DEFAULT_TEST_RATIO,
        };

        let poll_interval = match get(&["POLL_INTERVAL_SECS"]) {
            Some(raw) => Duration::from_secs(parse(&raw, "POLL_INTERVAL_SECS")?),
            None => DEFAULT_POLL_INTERVAL,
        };

        let defaults = LivenessConfig::default();
        let liveness = LivenessConfig {
            host: get(&["HOST"]).unwrap_or(defaults.host),
            port: match get(&["PORT"]) {
                Some(raw) => parse(&raw, "PORT")?,
                None => defaults.port,
            },
        };

        Ok(Config {
            store,
            provider,
            market_data_api_key,
            market_data_base_url: get(&["MARKET_DATA_BASE_URL"]),
            order,
            test_ratio,
            poll_interval,
            http_timeout,
            liveness,
        })
    }

    pub fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new(self.market_data_api_key.clone());
        config.base_url = self.market_data_base_url.clone();
        config.timeout_seconds = self.http_timeout.as_secs();
        config
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            order: self.order,
            test_ratio: self.test_ratio,
        }
    }
}

fn parse<T>(raw: &str, name: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: format!("'{}': {}", raw, e),
    })
}
