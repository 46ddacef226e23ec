//! Route definitions for the liveness endpoint

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Body returned by the liveness route.
pub const LIVENESS_MESSAGE: &str = "Forecast service is running";

async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

/// Creates the liveness router: a single `GET /`.
pub fn create_router() -> Router {
    Router::new()
        .route("/", get(liveness))
        .layer(TraceLayer::new_for_http())
}
