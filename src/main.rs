//! OpenJobs ingestion service binary.
//! Wires the store, connector registry and scheduler, then serves the
//! operational HTTP API until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use openjobs_ingest::api::{self, AppState};
use openjobs_ingest::ingest::config::{SchedulerConfig, TopologyMode};
use openjobs_ingest::ingest::providers;
use openjobs_ingest::metrics::Metrics;
use openjobs_ingest::{init_tracing, store, PluginRegistry, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init()?;
    let store = store::from_env()?;

    let registry = Arc::new(PluginRegistry::new());
    providers::register_builtin(&registry, store.clone()).context("registering built-in connectors")?;

    let cfg = SchedulerConfig::from_env().context("loading scheduler config")?;
    if let TopologyMode::Remote(endpoints) = &cfg.topology {
        let ids: Vec<&str> = endpoints.iter().map(|e| e.id.as_str()).collect();
        tracing::info!(plugins = ?ids, "using HTTP plugin services");
    } else {
        tracing::info!(connectors = ?registry.ids(), "using in-process connectors");
    }

    // An invalid cron expression is a deployment error.
    let scheduler = Arc::new(Scheduler::new(registry, cfg).context("building scheduler")?);
    Metrics::record_cadence(scheduler.cadence());
    scheduler.start();

    let app = api::router(AppState {
        scheduler: scheduler.clone(),
        store,
    })
    .merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "openjobs API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    scheduler.stop();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
