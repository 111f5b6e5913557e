//! Runs one built-in connector as a standalone plugin service
//! (`GET /health`, `GET /jobs`, `POST /sync`).
//!
//! `PLUGIN_CONNECTOR` picks the connector; `PORT` defaults to the port the
//! orchestrator expects for that plugin.

use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use tokio::net::TcpListener;

use openjobs_ingest::ingest::config::default_plugin_url;
use openjobs_ingest::ingest::plugin_server::plugin_router;
use openjobs_ingest::ingest::providers::{self, BUILTIN_IDS};
use openjobs_ingest::{init_tracing, store};

fn default_port(id: &str) -> Option<u16> {
    default_plugin_url(id)?.rsplit(':').next()?.parse().ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let id = std::env::var("PLUGIN_CONNECTOR").map_err(|_| {
        anyhow!(
            "PLUGIN_CONNECTOR must name a connector: {}",
            BUILTIN_IDS.join(", ")
        )
    })?;
    let store = store::from_env()?;
    let connector = providers::build_connector(id.trim(), store)
        .with_context(|| format!("building connector {id}"))?;

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .or_else(|| default_port(connector.id()))
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(plugin = connector.id(), %addr, "plugin service listening");

    axum::serve(listener, plugin_router(connector))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving HTTP")?;
    Ok(())
}
