// tests/common/mod.rs
//
// Shared fakes for the integration tests: scripted connectors, a store that
// fails on demand and a helper that serves a Router on an ephemeral port.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use tokio::net::TcpListener;

use openjobs_ingest::{
    run_sync_cycle, Connector, ConnectorError, JobRecord, JobStore, MemoryJobStore, StoreError,
    SyncAttempt,
};

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, d, 9, 0, 0).unwrap()
}

pub fn job(id: &str, d: u32) -> JobRecord {
    let mut r = JobRecord::new(id, day(d));
    r.title = format!("Job {id}");
    r.company = "Acme".into();
    r
}

/// Connector that returns a fixed batch (or a fixed error) and records how
/// often it was called. `sync_jobs` runs the real sync cycle against `store`.
pub struct ScriptedConnector {
    pub id: String,
    pub batch: Vec<JobRecord>,
    pub fail_with: Option<String>,
    pub store: Arc<dyn JobStore>,
    pub calls: AtomicUsize,
    /// Shared call journal, to check run order across connectors.
    pub journal: Option<Arc<Mutex<Vec<String>>>>,
    /// Time each `sync_jobs` call spends before doing any work.
    pub delay: Duration,
}

impl ScriptedConnector {
    pub fn new(id: &str, batch: Vec<JobRecord>, store: Arc<dyn JobStore>) -> Self {
        Self {
            id: id.to_string(),
            batch,
            fail_with: None,
            store,
            calls: AtomicUsize::new(0),
            journal: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing(id: &str, msg: &str, store: Arc<dyn JobStore>) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Self::new(id, Vec::new(), store)
        }
    }

    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError> {
        match &self.fail_with {
            Some(msg) => Err(ConnectorError::Status {
                status: 503,
                body: msg.clone(),
            }),
            None => Ok(self.batch.clone()),
        }
    }

    async fn sync_jobs(&self) -> Result<(), ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(j) = &self.journal {
            j.lock().unwrap().push(self.id.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        run_sync_cycle(self, self.store.as_ref()).await.map(|_| ())
    }
}

/// Wraps a [`MemoryJobStore`]; inserts of ids listed in `reject_ids` fail
/// with a backend error.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryJobStore,
    pub reject_ids: Vec<String>,
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn create_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        if self.reject_ids.contains(&job.id) {
            return Err(StoreError::Backend(format!("write refused for {}", job.id)));
        }
        self.inner.create_job(job).await
    }

    async fn get_job(&self, id: &str) -> Result<JobRecord, StoreError> {
        self.inner.get_job(id).await
    }

    async fn get_most_recent_job(&self, id_prefix: &str) -> Result<JobRecord, StoreError> {
        self.inner.get_most_recent_job(id_prefix).await
    }

    async fn log_sync(&self, attempt: &SyncAttempt) -> Result<(), StoreError> {
        self.inner.log_sync(attempt).await
    }

    async fn get_recent_sync_logs(&self, limit: usize) -> Result<Vec<SyncAttempt>, StoreError> {
        self.inner.get_recent_sync_logs(limit).await
    }
}

/// Serves `app` on 127.0.0.1 with an OS-assigned port and returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

/// An address nothing listens on: bind, read the port, drop the listener.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}
