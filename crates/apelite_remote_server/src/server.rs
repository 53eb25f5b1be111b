//! HTTP surface of the remote server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::DocumentStore;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

#[derive(Clone)]
struct ServerState {
    store: Arc<DocumentStore>,
    healthy: Arc<AtomicBool>,
}

/// The reference remote server.
///
/// # Example
///
/// ```rust,ignore
/// use apelite_remote_server::{RemoteServer, ServerConfig};
///
/// let running = RemoteServer::new(ServerConfig::ephemeral()).spawn().await?;
/// println!("remote at {}", running.url());
/// running.shutdown().await;
/// ```
pub struct RemoteServer {
    config: ServerConfig,
    state: ServerState,
}

impl RemoteServer {
    /// Creates a server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(DocumentStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<DocumentStore>) -> Self {
        let healthy = Arc::new(AtomicBool::new(config.healthy));
        Self {
            config,
            state: ServerState { store, healthy },
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the document store.
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.state.store
    }

    /// Builds the router serving the document contract.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/collections/:collection/documents", get(list_documents))
            .route(
                "/collections/:collection/documents/:id",
                get(get_document).put(put_document),
            )
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serves until the process ends.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("remote server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Binds and serves in a background task.
    pub async fn spawn(self) -> ServerResult<RunningServer> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let (tx, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("remote server on {addr} failed: {e}");
            }
        });
        info!("remote server listening on {addr}");

        Ok(RunningServer {
            addr,
            state: self.state,
            shutdown: tx,
            task,
        })
    }
}

/// Handle to a server running in the background.
pub struct RunningServer {
    addr: SocketAddr,
    state: ServerState,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningServer {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients should use.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Returns the document store.
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.state.store
    }

    /// Makes `/health` succeed or fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Stops accepting connections and waits for the server task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("remote server task ended abnormally: {e}");
        }
    }
}

async fn health(State(state): State<ServerState>) -> ServerResult<Json<Value>> {
    if state.healthy.load(Ordering::SeqCst) {
        Ok(Json(json!({ "status": "ok" })))
    } else {
        Err(ServerError::Unavailable)
    }
}

async fn list_documents(
    State(state): State<ServerState>,
    Path(collection): Path<String>,
) -> Json<Vec<Value>> {
    Json(state.store.list(&collection))
}

async fn get_document(
    State(state): State<ServerState>,
    Path((collection, id)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    state.store.get(&collection, &id).map(Json)
}

async fn put_document(
    State(state): State<ServerState>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ServerResult<(StatusCode, Json<Value>)> {
    let created = state.store.put(&collection, &id, body)?;
    debug!(collection = %collection, id = %id, created, "document stored");
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(state.store.get(&collection, &id)?)))
}
