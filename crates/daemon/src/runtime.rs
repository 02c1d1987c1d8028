// Process wiring: queue, worker pool, HTTP server, shutdown.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::{router, AppContext};
use crate::config::ServerConfig;
use crate::dispatch::ActionDispatcher;
use crate::git::GitSync;
use crate::hook::HookValidator;
use crate::import::CourseImporter;
use crate::queue::{ActionQueue, WorkerPool};

/// Serve the webhook receiver on `addr` until Ctrl-C or SIGTERM, then stop
/// the workers after their current action.
pub async fn run(config: ServerConfig, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;
    serve(config, listener, shutdown_signal()).await
}

/// Like [`run`] on an already bound listener, stopping when `shutdown` resolves.
pub async fn serve<F>(config: ServerConfig, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let (queue, receiver) = ActionQueue::new();
    let dispatcher = ActionDispatcher::new(
        GitSync::new(&config.repo_dir),
        CourseImporter::new(config.import_settings()),
    );
    let pool = WorkerPool::start(config.num_workers, queue.clone(), receiver, dispatcher)
        .context("failed to start worker pool")?;

    let ctx = AppContext::new(queue, HookValidator::new(&config.repo_dir));
    let listen_addr = listener.local_addr().context("listener has no local address")?;
    info!(
        %listen_addr,
        workers = pool.size(),
        repo_dir = %config.repo_dir.display(),
        "starting gitreload server"
    );

    let served = axum::serve(listener, router(ctx)).with_graceful_shutdown(shutdown).await;
    pool.shutdown().await;
    served.context("gitreload server exited unexpectedly")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
