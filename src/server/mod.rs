//! # Registry Server
//!
//! The npm-compatible HTTP surface. Package managers only ever issue `GET`s against it, so
//! every other method is refused; `OPTIONS` preflights are answered by the CORS layer.
#[cfg(test)]
mod tests;

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};

use atpkg::Registry;
use axum::routing::any;
use axum::Router;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const CORS_MAX_AGE: Duration = Duration::from_secs(7200);

/// Create the registry router.
pub fn create_router(registry: Registry) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(Any)
        .max_age(CORS_MAX_AGE);

    Router::new()
        .route("/", any(handlers::root))
        // package names may contain any number of segments, so they are parsed by hand
        .fallback(handlers::package)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Serves the registry on `listener` until interrupted.
pub async fn serve(listener: TcpListener, registry: Registry) -> std::io::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "registry listening");
    axum::serve(listener, create_router(registry))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for interrupts");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
