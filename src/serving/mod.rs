//! Serving Layer - prediction API over the promoted model
//!
//! Routes:
//! - `POST /predict`: `{"data": [{field: value}, ...]}` →
//!   `{"predictions": [0|1, ...]}`, one per record, in order
//! - `GET /health`: `{"status": "ok"}`
//!
//! Failures answer `{"detail": msg}`: 400 for a malformed body or bad
//! records, 503 when no model can be loaded. A failed request leaves the
//! server ready for the next one.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use churnline::serving::{router, FileLoader};
//!
//! # async fn example() -> churnline::Result<()> {
//! let loader = Arc::new(FileLoader::new("models/best_model_0f3c.json"));
//! churnline::serving::serve("0.0.0.0:8000", router(loader)).await?;
//! # Ok(())
//! # }
//! ```

mod handlers;
mod loader;

pub use handlers::{health, predict, ApiError, PredictRequest, PredictResponse};
pub use loader::{FileLoader, ModelLoader, RegistryLoader, StaticLoader};

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::Result;

/// Build the application router around `loader`.
pub fn router<L: ModelLoader + 'static>(loader: Arc<L>) -> Router {
    Router::new()
        .route("/predict", post(predict::<L>))
        .route("/health", get(health))
        .with_state(loader)
}

/// Bind `addr` and serve `app` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: &str, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "prediction server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("prediction server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
}
