//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::LogStore;

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<LogStore>,
}

/// JSON query API over the log store.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, store: Arc<LogStore>) -> Self {
        Self {
            state: AppState { config, store },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/api/logs", get(handlers::handle_get_logs))
            .route("/api/logs/export", get(handlers::handle_export_logs))
            .route("/api/endpoints", get(handlers::handle_get_endpoints))
            .route("/api/status", get(handlers::handle_status))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
