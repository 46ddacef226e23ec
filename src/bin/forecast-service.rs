//! Forecast Service Binary
//!
//! Run with: `cargo run --bin forecast-service`
//!
//! Configuration comes from the environment (see `fx_forecast::config`).
//! Set RUST_LOG to control log level, e.g. `RUST_LOG=fx_forecast=debug`.

use clap::Parser;
use fx_forecast::{
    build_provider, spawn_liveness, watch_liveness, Config, ForecastPipeline, ForecastService,
    ForecastStore, RestStore, SqliteStore, StoreBackend,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Process the pending requests once and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Do not start the liveness endpoint
    #[arg(long, default_value_t = false)]
    no_liveness: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let provider = build_provider(config.provider, config.provider_config())?;
    let store: Arc<dyn ForecastStore> = match &config.store {
        StoreBackend::Sqlite { path } => {
            tracing::info!("Using local store at {}", path);
            Arc::new(SqliteStore::new(path)?)
        }
        StoreBackend::Rest(rest) => {
            tracing::info!("Using hosted store at {}", rest.base_url);
            Arc::new(RestStore::new(rest.clone())?)
        }
    };

    let pipeline = ForecastPipeline::new(Arc::from(provider), store, config.pipeline_settings())?;
    let mut service = ForecastService::new(pipeline).with_poll_interval(config.poll_interval);

    tracing::info!(
        provider = %config.provider,
        order = %config.order,
        test_ratio = config.test_ratio,
        "Starting forecast service"
    );

    if cli.once {
        let report = service.run_once().await?;
        tracing::info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            "Batch run complete"
        );
        return Ok(());
    }

    let liveness = if cli.no_liveness {
        None
    } else {
        let handle = spawn_liveness(&config.liveness).await?;
        Some(tokio::spawn(watch_liveness(handle)))
    };

    service
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Some(watcher) = liveness {
        if watcher.is_finished() {
            if let Ok(exit) = watcher.await {
                tracing::info!("Liveness endpoint had ended earlier: {:?}", exit);
            }
        } else {
            watcher.abort();
        }
    }

    Ok(())
}
