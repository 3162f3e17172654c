//! Sisyphus - Remote Compilation Service
//!
//! Accepts compile requests over HTTP, admits them into a bounded worker
//! pool, and runs each one inside an isolated sandbox (a local Docker
//! daemon or a cluster-scheduled Kubernetes Job).

mod compiler;
mod config;
mod environments;
mod http;
mod pool;
mod rate_limit;
mod sandbox;
mod store;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::environments::EnvironmentRegistry;
use crate::pool::WorkerPool;
use crate::sandbox::cluster::ClusterBackend;
use crate::sandbox::docker::LocalDaemonBackend;
use crate::sandbox::SandboxBackend;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sisyphus=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sisyphus Compile Service");

    let config = Config::from_env();
    let registry = Arc::new(EnvironmentRegistry::load_or_default(None));

    let backend: Arc<dyn SandboxBackend> = if Config::running_in_cluster() {
        tracing::info!("cluster identity detected, selecting cluster-scheduled sandbox backend");
        Arc::new(ClusterBackend::connect(config.cluster_namespace.clone()).await?)
    } else {
        tracing::info!("selecting local-daemon sandbox backend");
        Arc::new(LocalDaemonBackend::connect()?)
    };

    let compile_engine = Arc::new(compiler::Compiler::new(
        backend.clone(),
        registry.clone(),
        config.compile_timeout,
    ));

    // Building images on demand is explicitly rejected (supply-chain risk,
    // DoS exposure, unpredictable latency): refuse to start without them.
    if let Err(e) = compile_engine.verify_images_present().await {
        anyhow::bail!("startup image liveness probe failed: {e}");
    }

    let job_store = store::build_store(config.redis_url.as_deref())?;

    let worker_pool = Arc::new(WorkerPool::spawn(
        config.worker_count,
        config.queue_capacity,
        compile_engine,
        job_store.clone(),
    ));

    let rate_limiter = Arc::new(rate_limit::RateLimiter::new(
        config.rate_limit_capacity,
        config.rate_limit_window,
    ));
    let _sweeper = rate_limiter.clone().spawn_sweeper();

    let state = http::AppState::new(
        job_store,
        worker_pool.clone(),
        registry,
        rate_limiter,
        Arc::new(config.clone()),
    );

    let app = http::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Sisyphus listening");

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining worker pool...");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while !shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    })
    .await?;

    worker_pool.close().await;
    backend.close().await.ok();

    tracing::info!("Sisyphus shutdown complete");
    Ok(())
}
