// tests/http_plugin.rs
//
// HttpPluginConnector against a throwaway axum server on 127.0.0.1:0.
//
// Covered:
// - GET /jobs success envelope -> records, duplicate ids collapsed
// - success=false -> Remote error carrying the plugin message
// - non-2xx -> Status error with the body
// - data that is not a list -> Shape error
// - POST /sync success and failure
// - plugin_router round trip (connector served as a plugin, read back remotely)
mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use common::{job, serve, ScriptedConnector};
use openjobs_ingest::ingest::http_plugin::{HttpPluginConnector, DEFAULT_PLUGIN_TIMEOUT};
use openjobs_ingest::ingest::plugin_server::plugin_router;
use openjobs_ingest::{Connector, ConnectorError, MemoryJobStore, SyncStatus};

fn connector(base: &str) -> HttpPluginConnector {
    HttpPluginConnector::new("eures", "EURES HTTP Plugin", base, Duration::from_secs(5))
        .expect("client")
}

fn jobs_route(status: StatusCode, body: Value) -> Router {
    Router::new().route(
        "/jobs",
        get(move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    )
}

#[tokio::test]
async fn fetch_maps_success_envelope() {
    let base = serve(jobs_route(
        StatusCode::OK,
        json!({
            "success": true,
            "data": [
                {"id": "eures-1", "title": "Rust dev", "company": "Acme",
                 "posted_date": "2025-09-01T08:00:00Z", "is_remote": true},
                {"id": "eures-2", "title": "Go dev", "salary_min": 40000}
            ]
        }),
    ))
    .await;

    let recs = connector(&base).fetch_jobs().await.expect("fetch");
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].id, "eures-1");
    assert!(recs[0].is_remote);
    assert_eq!(recs[1].salary_min, Some(40000));
    assert_eq!(recs[1].company, "");
}

#[tokio::test]
async fn fetched_batch_has_unique_ids() {
    let base = serve(jobs_route(
        StatusCode::OK,
        json!({
            "success": true,
            "data": [
                {"id": "eures-1", "title": "First"},
                {"id": "eures-1", "title": "Repeat"},
                {"id": "eures-2"}
            ]
        }),
    ))
    .await;

    let recs = connector(&base).fetch_jobs().await.expect("fetch");
    let ids: Vec<&str> = recs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["eures-1", "eures-2"]);
    assert_eq!(recs[0].title, "First", "first occurrence wins");
}

#[tokio::test]
async fn success_false_is_remote_error() {
    let base = serve(jobs_route(
        StatusCode::OK,
        json!({"success": false, "error": "scraper blocked"}),
    ))
    .await;

    let err = connector(&base).fetch_jobs().await.unwrap_err();
    match err {
        ConnectorError::Remote(msg) => assert_eq!(msg, "scraper blocked"),
        other => panic!("expected Remote, got {other}"),
    }
}

#[tokio::test]
async fn non_2xx_keeps_status_and_body() {
    let base = serve(jobs_route(
        StatusCode::BAD_GATEWAY,
        json!({"success": false, "error": "upstream"}),
    ))
    .await;

    let err = connector(&base).fetch_jobs().await.unwrap_err();
    match err {
        ConnectorError::Status { status, body } => {
            assert_eq!(status, 502);
            assert!(body.contains("upstream"));
        }
        other => panic!("expected Status, got {other}"),
    }
}

#[tokio::test]
async fn data_must_be_a_list() {
    let base = serve(jobs_route(
        StatusCode::OK,
        json!({"success": true, "data": {"id": "eures-1"}}),
    ))
    .await;

    let err = connector(&base).fetch_jobs().await.unwrap_err();
    assert!(matches!(err, ConnectorError::Shape(_)), "got {err}");
}

#[tokio::test]
async fn sync_posts_and_reads_envelope() {
    let app = Router::new()
        .route(
            "/sync",
            post(|| async { Json(json!({"success": true, "message": "done"})) }),
        )
        .route(
            "/fail/sync",
            post(|| async { Json(json!({"success": false})) }),
        );
    let base = serve(app).await;

    connector(&base).sync_jobs().await.expect("sync ok");

    let err = connector(&format!("{base}/fail/"))
        .sync_jobs()
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "plugin reported failure: unknown error");
}

#[tokio::test]
async fn unreachable_plugin_is_http_error() {
    let base = common::dead_url().await;
    let err = connector(&base).fetch_jobs().await.unwrap_err();
    assert!(matches!(err, ConnectorError::Http(_)), "got {err}");
}

#[tokio::test]
async fn plugin_router_round_trip() {
    let store = Arc::new(MemoryJobStore::new());
    let local = Arc::new(ScriptedConnector::new(
        "remotive",
        vec![job("remotive-1", 1), job("remotive-2", 2)],
        store.clone(),
    ));
    let base = serve(plugin_router(local)).await;

    let remote =
        HttpPluginConnector::new("remotive", "Remotive HTTP Plugin", &base, DEFAULT_PLUGIN_TIMEOUT)
            .unwrap();
    let recs = remote.fetch_jobs().await.expect("fetch via plugin");
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[1].posted_date, common::day(2));

    remote.sync_jobs().await.expect("sync via plugin");
    assert_eq!(store.job_count(), 2);
    let logs = store.sync_logs();
    assert_eq!(logs.len(), 1, "the plugin writes the only audit entry");
    assert_eq!(logs[0].status, SyncStatus::Success);
}

#[tokio::test]
async fn plugin_router_reports_fetch_failure() {
    let store = Arc::new(MemoryJobStore::new());
    let local = Arc::new(ScriptedConnector::failing("jooble", "quota", store));
    let base = serve(plugin_router(local)).await;

    let resp = reqwest::get(format!("{base}/jobs")).await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("quota"));

    let health: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["data"]["plugin"], "jooble");
}
