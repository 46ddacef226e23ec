//! Liveness endpoint
//!
//! Keeps a port open for the hosting platform's health check. It shares no
//! state with the poll loop.

mod routes;

pub use routes::{create_router, LIVENESS_MESSAGE};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Liveness endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Bind address (default: "0.0.0.0")
    pub host: String,
    /// Bind port (default: 10000)
    pub port: u16,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        LivenessConfig {
            host: "0.0.0.0".to_string(),
            port: 10000,
        }
    }
}

impl LivenessConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        LivenessConfig {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serves the liveness router on an already bound listener.
pub async fn run_liveness(listener: TcpListener) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Liveness endpoint listening on http://{}", addr);
    }
    axum::serve(listener, create_router()).await
}

/// Binds the configured address and serves the liveness router on its own task.
///
/// # Errors
/// Returns an error if the address cannot be bound.
///
/// # Example
/// ```rust,no_run
/// use fx_forecast::server::{spawn_liveness, LivenessConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = spawn_liveness(&LivenessConfig::default()).await?;
///     handle.await??;
///     Ok(())
/// }
/// ```
pub async fn spawn_liveness(
    config: &LivenessConfig,
) -> std::io::Result<JoinHandle<std::io::Result<()>>> {
    let listener = TcpListener::bind(config.address()).await?;
    Ok(tokio::spawn(run_liveness(listener)))
}

/// How the liveness task ended.
#[derive(Debug)]
pub enum LivenessExit {
    /// Server future returned without error
    Stopped,
    /// Server returned an I/O error
    Failed(std::io::Error),
    /// Task panicked
    Panicked,
    /// Task was aborted
    Cancelled,
}

/// Waits for a liveness task to end and logs how it ended.
///
/// The poll loop keeps running regardless; a dead endpoint only shows up in
/// the logs and in the platform's health check.
pub async fn watch_liveness(handle: JoinHandle<std::io::Result<()>>) -> LivenessExit {
    let exit = match handle.await {
        Ok(Ok(())) => LivenessExit::Stopped,
        Ok(Err(e)) => LivenessExit::Failed(e),
        Err(e) if e.is_panic() => LivenessExit::Panicked,
        Err(_) => LivenessExit::Cancelled,
    };
    match &exit {
        LivenessExit::Stopped => tracing::warn!("Liveness endpoint stopped"),
        LivenessExit::Failed(e) => tracing::error!("Liveness endpoint failed: {}", e),
        LivenessExit::Panicked => tracing::error!("Liveness endpoint panicked"),
        LivenessExit::Cancelled => tracing::debug!("Liveness endpoint cancelled"),
    }
    exit
}
