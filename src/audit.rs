//! Sync audit model.
//!
//! Every `sync_jobs` call writes exactly one [`SyncAttempt`]. The log is
//! append-only: "last success" for a connector is derived by filtering
//! `status == success` and taking the newest `started_at`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    /// Fetch worked but some records could not be checked or stored.
    Partial,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Error => "error",
        }
    }
}

/// Per-record tallies collected while storing a fetched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl SyncCounts {
    /// `fetched == inserted + duplicates + failed`
    pub fn is_conserved(&self) -> bool {
        self.fetched == self.inserted + self.duplicates + self.failed
    }
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAttempt {
    pub connector_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub jobs_fetched: usize,
    pub jobs_inserted: usize,
    pub jobs_duplicates: usize,
    #[serde(default)]
    pub jobs_failed: usize,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SyncAttempt {
    /// Attempt whose fetch step failed: nothing was fetched or stored.
    pub fn fetch_failed(
        connector: &str,
        started_at: DateTime<Utc>,
        error: impl ToString,
    ) -> Self {
        Self {
            connector_name: connector.to_string(),
            started_at,
            completed_at: Utc::now(),
            jobs_fetched: 0,
            jobs_inserted: 0,
            jobs_duplicates: 0,
            jobs_failed: 0,
            status: SyncStatus::Error,
            error_message: Some(error.to_string()),
        }
    }

    /// Attempt for a completed batch. Any failed record downgrades the status
    /// to `partial`.
    pub fn completed(connector: &str, started_at: DateTime<Utc>, counts: SyncCounts) -> Self {
        let (status, error_message) = if counts.failed == 0 {
            (SyncStatus::Success, None)
        } else {
            (
                SyncStatus::Partial,
                Some(format!(
                    "{} of {} records could not be stored",
                    counts.failed, counts.fetched
                )),
            )
        };
        Self {
            connector_name: connector.to_string(),
            started_at,
            completed_at: Utc::now(),
            jobs_fetched: counts.fetched,
            jobs_inserted: counts.inserted,
            jobs_duplicates: counts.duplicates,
            jobs_failed: counts.failed,
            status,
            error_message,
        }
    }

    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            fetched: self.jobs_fetched,
            inserted: self.jobs_inserted,
            duplicates: self.jobs_duplicates,
            failed: self.jobs_failed,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds().max(0)
    }
}

/// Newest successful attempt per connector.
pub fn latest_success_by_connector(log: &[SyncAttempt]) -> BTreeMap<String, SyncAttempt> {
    latest_by_connector(log.iter().filter(|a| a.status == SyncStatus::Success))
}

/// Newest attempt per connector, whatever its status.
pub fn latest_attempt_by_connector(log: &[SyncAttempt]) -> BTreeMap<String, SyncAttempt> {
    latest_by_connector(log.iter())
}

fn latest_by_connector<'a>(
    attempts: impl Iterator<Item = &'a SyncAttempt>,
) -> BTreeMap<String, SyncAttempt> {
    let mut out: BTreeMap<String, SyncAttempt> = BTreeMap::new();
    for a in attempts {
        match out.get(&a.connector_name) {
            Some(prev) if prev.started_at >= a.started_at => {}
            _ => {
                out.insert(a.connector_name.clone(), a.clone());
            }
        }
    }
    out
}
