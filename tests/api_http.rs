// tests/api_http.rs
//
// HTTP-level tests for the operational API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /sync/manual
// - GET /sync/logs (ordering + limit)
// - GET /plugins/status
// - GET /jobs/{id} (hit + 404)
mod common;

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use common::{job, ScriptedConnector};
use openjobs_ingest::api::{self, AppState};
use openjobs_ingest::ingest::config::SchedulerConfig;
use openjobs_ingest::{JobStore, MemoryJobStore, PluginRegistry, Scheduler};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct Fixture {
    app: Router,
    store: Arc<MemoryJobStore>,
}

/// Router with two scripted connectors (one healthy, one failing).
fn fixture() -> Fixture {
    let store = Arc::new(MemoryJobStore::new());
    let registry = Arc::new(PluginRegistry::new());
    registry.register(Arc::new(ScriptedConnector::new(
        "remotive",
        vec![job("remotive-1", 1), job("remotive-2", 2)],
        store.clone(),
    )));
    registry.register(Arc::new(ScriptedConnector::failing(
        "jooble",
        "quota exceeded",
        store.clone(),
    )));
    let scheduler =
        Arc::new(Scheduler::new(registry, SchedulerConfig::default()).expect("scheduler"));
    let app = api::router(AppState {
        scheduler,
        store: store.clone() as Arc<dyn JobStore>,
    });
    Fixture { app, store }
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json: Json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

#[tokio::test]
async fn api_health_returns_200_and_envelope() {
    let fx = fixture();
    let (status, body) = call(&fx.app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK, "health should be 200");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["service"], "openjobs-ingest");
}

#[tokio::test]
async fn api_manual_sync_reports_per_connector_outcome() {
    let fx = fixture();
    let (status, body) = call(&fx.app, "POST", "/sync/manual").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let report = &body["data"];
    assert_eq!(report["trigger"], "manual");
    assert_eq!(report["succeeded"], serde_json::json!(["remotive"]));
    assert_eq!(report["failed"][0]["connector"], "jooble");
    assert_eq!(fx.store.job_count(), 2);
}

#[tokio::test]
async fn api_sync_logs_respects_limit() {
    let fx = fixture();
    for _ in 0..2 {
        let (status, _) = call(&fx.app, "POST", "/sync/manual").await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(fx.store.sync_logs().len(), 4);

    let (status, body) = call(&fx.app, "GET", "/sync/logs?limit=3").await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["data"].as_array().expect("array of attempts");
    assert_eq!(logs.len(), 3);
    let started = |i: usize| {
        chrono::DateTime::parse_from_rfc3339(logs[i]["started_at"].as_str().unwrap()).unwrap()
    };
    assert!(started(0) >= started(1), "newest first");

    // limit=0 is clamped up to 1
    let (_, body) = call(&fx.app, "GET", "/sync/logs?limit=0").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn api_plugins_status_lists_last_attempts() {
    let fx = fixture();
    call(&fx.app, "POST", "/sync/manual").await;

    let (status, body) = call(&fx.app, "GET", "/plugins/status").await;
    assert_eq!(status, StatusCode::OK);
    let plugins = body["data"].as_array().expect("plugin list");
    assert_eq!(plugins.len(), 2);

    let jooble = plugins.iter().find(|p| p["id"] == "jooble").unwrap();
    assert_eq!(jooble["last_attempt"]["status"], "error");
    assert!(jooble["last_success"].is_null());

    let remotive = plugins.iter().find(|p| p["id"] == "remotive").unwrap();
    assert_eq!(remotive["name"], "Scripted");
    assert_eq!(remotive["last_success"]["jobs_inserted"], 2);
}

#[tokio::test]
async fn api_get_job_and_missing_job() {
    let fx = fixture();
    fx.store.create_job(&job("af-42", 3)).await.unwrap();

    let (status, body) = call(&fx.app, "GET", "/jobs/af-42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "af-42");

    let (status, body) = call(&fx.app, "GET", "/jobs/af-43").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
