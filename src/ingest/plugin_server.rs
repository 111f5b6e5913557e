// src/ingest/plugin_server.rs
//! HTTP surface a connector exposes when it runs as its own plugin service.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::ingest::http_plugin::PluginEnvelope;
use crate::ingest::types::Connector;

#[derive(Clone)]
struct PluginState {
    connector: Arc<dyn Connector>,
}

pub fn plugin_router(connector: Arc<dyn Connector>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(jobs))
        .route("/sync", post(sync))
        .layer(CorsLayer::very_permissive())
        .with_state(PluginState { connector })
}

async fn health(State(state): State<PluginState>) -> Json<PluginEnvelope> {
    Json(PluginEnvelope::ok(json!({
        "status": "healthy",
        "plugin": state.connector.id(),
        "name": state.connector.name(),
    })))
}

async fn jobs(State(state): State<PluginState>) -> (StatusCode, Json<PluginEnvelope>) {
    match state.connector.fetch_jobs().await {
        Ok(records) => match serde_json::to_value(&records) {
            Ok(data) => (StatusCode::OK, Json(PluginEnvelope::ok(data))),
            Err(e) => failure(e.to_string()),
        },
        Err(e) => {
            tracing::warn!(plugin = state.connector.id(), error = %e, "fetch failed");
            failure(e.to_string())
        }
    }
}

async fn sync(State(state): State<PluginState>) -> (StatusCode, Json<PluginEnvelope>) {
    match state.connector.sync_jobs().await {
        Ok(()) => (
            StatusCode::OK,
            Json(PluginEnvelope::message(format!(
                "{} sync completed",
                state.connector.name()
            ))),
        ),
        Err(e) => {
            tracing::warn!(plugin = state.connector.id(), error = %e, "sync failed");
            failure(e.to_string())
        }
    }
}

fn failure(msg: String) -> (StatusCode, Json<PluginEnvelope>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(PluginEnvelope::failure(msg)),
    )
}
