//! Router construction and serving.

use crate::config::ApiConfig;
use crate::handlers;
use apelite_sync_engine::SyncEngine;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Path prefix of every operator route.
pub const API_PREFIX: &str = "/api/hybrid";

/// State shared by the handlers.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide sync engine.
    pub engine: Arc<SyncEngine>,
}

/// The operator API server.
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    /// Creates a server around `engine`.
    pub fn new(config: ApiConfig, engine: Arc<SyncEngine>) -> Self {
        Self {
            config,
            state: AppState { engine },
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Builds the router with all routes.
    pub fn router(&self) -> Router {
        let routes = Router::new()
            .route("/status", get(handlers::status))
            .route("/sync", post(handlers::sync))
            .route("/backup", post(handlers::backup))
            .route("/backups", get(handlers::backups))
            .route(
                "/config",
                get(handlers::get_config).put(handlers::put_config),
            )
            .route("/conflicts", get(handlers::conflicts))
            .route("/conflicts/:id/resolve", post(handlers::resolve_conflict));

        let mut router = Router::new()
            .nest(API_PREFIX, routes)
            .with_state(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Serves until `shutdown` completes.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        info!("operator API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
