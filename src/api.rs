use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::audit::{latest_attempt_by_connector, latest_success_by_connector, SyncAttempt};
use crate::ingest::http_plugin::PluginEnvelope;
use crate::ingest::scheduler::Scheduler;
use crate::models::ConnectorIdentity;
use crate::store::JobStore;

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<dyn JobStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync/manual", post(manual_sync))
        .route("/sync/logs", get(sync_logs))
        .route("/plugins/status", get(plugins_status))
        .route("/jobs/{id}", get(get_job))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

type Reply = (StatusCode, Json<PluginEnvelope>);

fn ok<T: Serialize>(data: T) -> Reply {
    match serde_json::to_value(data) {
        Ok(v) => (StatusCode::OK, Json(PluginEnvelope::ok(v))),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn fail(status: StatusCode, msg: String) -> Reply {
    (status, Json(PluginEnvelope::failure(msg)))
}

async fn health() -> Json<PluginEnvelope> {
    Json(PluginEnvelope::ok(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn manual_sync(State(state): State<AppState>) -> Reply {
    tracing::info!("manual sync requested");
    match state.scheduler.run_manual_sync().await {
        Ok(report) => ok(report),
        Err(e) => {
            tracing::error!(error = ?e, "manual sync could not run");
            fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

#[derive(Deserialize)]
struct LogsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn sync_logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Reply {
    let limit = q.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    match state.store.get_recent_sync_logs(limit).await {
        Ok(logs) => ok(logs),
        Err(e) => {
            tracing::warn!(error = %e, "reading sync logs failed");
            fail(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

#[derive(Serialize)]
struct PluginStatus {
    #[serde(flatten)]
    identity: ConnectorIdentity,
    last_attempt: Option<SyncAttempt>,
    last_success: Option<SyncAttempt>,
}

async fn plugins_status(State(state): State<AppState>) -> Reply {
    let connectors = match state.scheduler.active_connectors() {
        Ok(c) => c,
        Err(e) => return fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    };
    let log = match state.store.get_recent_sync_logs(MAX_LOG_LIMIT).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!(error = %e, "reading sync logs failed");
            return fail(StatusCode::BAD_GATEWAY, e.to_string());
        }
    };
    let mut attempts = latest_attempt_by_connector(&log);
    let mut successes = latest_success_by_connector(&log);

    let out: Vec<PluginStatus> = connectors
        .iter()
        .map(|c| PluginStatus {
            identity: c.identity(),
            last_attempt: attempts.remove(c.id()),
            last_success: successes.remove(c.id()),
        })
        .collect();
    ok(out)
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    match state.store.get_job(&id).await {
        Ok(job) => ok(job),
        Err(e) if e.is_not_found() => fail(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => fail(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}
