//! Long-running server commands.

use super::{CliResult, Workspace};
use apelite_api::{ApiConfig, ApiServer};
use apelite_remote_server::{RemoteServer, ServerConfig};
use apelite_sync_engine::Scheduler;
use std::net::SocketAddr;
use tracing::{error, info};

/// Runs the operator API, and the timers when `scheduler` is set, until
/// Ctrl-C.
pub async fn run(workspace: &Workspace, bind: SocketAddr, scheduler: bool, cors: bool) -> CliResult<()> {
    let engine = workspace.engine()?;
    info!(data_root = %workspace.root().path().display(), "engine ready");

    let timers = scheduler.then(|| Scheduler::start(engine.clone()));
    let config = ApiConfig::new()
        .with_host(bind.ip().to_string())
        .with_port(bind.port())
        .with_cors(cors);

    let served = ApiServer::new(config, engine)
        .serve_with_shutdown(shutdown_signal())
        .await;

    if let Some(timers) = timers {
        timers.stop().await;
    }
    served?;
    info!("operator API stopped");
    Ok(())
}

/// Runs the reference remote document store until Ctrl-C.
pub async fn run_remote(bind: SocketAddr) -> CliResult<()> {
    let running = RemoteServer::new(ServerConfig::new(bind)).spawn().await?;
    println!("Remote document store at {}", running.url());
    shutdown_signal().await;
    running.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
