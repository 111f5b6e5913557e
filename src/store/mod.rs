//! Persistence boundary for job records and the sync audit log.

pub mod supabase;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::audit::SyncAttempt;
use crate::models::JobRecord;

pub use supabase::SupabaseJobStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No record matches; also signals "no jobs for this source yet".
    #[error("not found: {0}")]
    NotFound(String),

    /// Insert rejected because the id is already stored.
    #[error("job already exists: {0}")]
    AlreadyExists(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Store capability consumed by connectors and the scheduler.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fails with [`StoreError::AlreadyExists`] when the id is taken.
    async fn create_job(&self, job: &JobRecord) -> Result<(), StoreError>;

    async fn get_job(&self, id: &str) -> Result<JobRecord, StoreError>;

    /// Record with the newest `posted_date` whose id starts with `id_prefix`.
    async fn get_most_recent_job(&self, id_prefix: &str) -> Result<JobRecord, StoreError>;

    /// Appends one audit entry.
    async fn log_sync(&self, attempt: &SyncAttempt) -> Result<(), StoreError>;

    /// Newest entries first.
    async fn get_recent_sync_logs(&self, limit: usize) -> Result<Vec<SyncAttempt>, StoreError>;
}

/// Picks the PostgREST store when `SUPABASE_URL` is set, else an in-memory one.
pub fn from_env() -> anyhow::Result<Arc<dyn JobStore>> {
    match SupabaseJobStore::from_env()? {
        Some(s) => {
            tracing::info!(url = %s.base_url(), "using PostgREST job store");
            Ok(Arc::new(s))
        }
        None => {
            tracing::warn!("SUPABASE_URL not set; using in-memory job store (data is lost on exit)");
            Ok(Arc::new(MemoryJobStore::new()))
        }
    }
}

/// Process-local store. Enforces unique ids and keeps the audit log in
/// insertion order.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
    sync_log: RwLock<Vec<SyncAttempt>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Audit entries oldest first.
    pub fn sync_logs(&self) -> Vec<SyncAttempt> {
        self.sync_log
            .read()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory store lock poisoned".into())
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<JobRecord, StoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_most_recent_job(&self, id_prefix: &str) -> Result<JobRecord, StoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        jobs.values()
            .filter(|j| j.id.starts_with(id_prefix))
            .max_by_key(|j| j.posted_date)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("no jobs with prefix {id_prefix}")))
    }

    async fn log_sync(&self, attempt: &SyncAttempt) -> Result<(), StoreError> {
        self.sync_log
            .write()
            .map_err(poisoned)?
            .push(attempt.clone());
        Ok(())
    }

    async fn get_recent_sync_logs(&self, limit: usize) -> Result<Vec<SyncAttempt>, StoreError> {
        let log = self.sync_log.read().map_err(poisoned)?;
        let mut out: Vec<SyncAttempt> = log.clone();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::SyncStatus;
    use chrono::{Duration, TimeZone, Utc};

    fn job(id: &str, day: u32) -> JobRecord {
        JobRecord::new(id, Utc.with_ymd_and_hms(2025, 9, day, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = MemoryJobStore::new();
        store.create_job(&job("remoteok-1", 1)).await.unwrap();
        let err = store.create_job(&job("remoteok-1", 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "remoteok-1"));
        assert_eq!(store.job_count(), 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryJobStore::new();
        let err = store.get_job("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn most_recent_respects_prefix() {
        let store = MemoryJobStore::new();
        store.create_job(&job("remoteok-1", 3)).await.unwrap();
        store.create_job(&job("remoteok-2", 7)).await.unwrap();
        store.create_job(&job("remotive-9", 20)).await.unwrap();

        let latest = store.get_most_recent_job("remoteok-").await.unwrap();
        assert_eq!(latest.id, "remoteok-2");

        let none = store.get_most_recent_job("jooble-").await.unwrap_err();
        assert!(none.is_not_found());
    }

    #[tokio::test]
    async fn recent_logs_are_newest_first_and_limited() {
        let store = MemoryJobStore::new();
        let t0 = Utc::now();
        for i in 0..5 {
            let mut a = SyncAttempt::fetch_failed("x", t0 + Duration::seconds(i), "e");
            a.status = SyncStatus::Error;
            store.log_sync(&a).await.unwrap();
        }
        let logs = store.get_recent_sync_logs(3).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs[0].started_at > logs[1].started_at);
        assert_eq!(logs[0].started_at, t0 + Duration::seconds(4));
    }

    #[tokio::test]
    async fn recent_logs_order_by_start_not_insertion() {
        let store = MemoryJobStore::new();
        let t0 = Utc::now();
        for offset in [10, 30, 20, 0] {
            let a = SyncAttempt::fetch_failed("x", t0 + Duration::seconds(offset), "e");
            store.log_sync(&a).await.unwrap();
        }
        let starts: Vec<_> = store
            .get_recent_sync_logs(2)
            .await
            .unwrap()
            .iter()
            .map(|a| a.started_at)
            .collect();
        assert_eq!(starts, vec![t0 + Duration::seconds(30), t0 + Duration::seconds(20)]);
    }
}
