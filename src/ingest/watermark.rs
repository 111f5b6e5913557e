//! Incremental-fetch watermark.
//!
//! The watermark is the `posted_date` of the newest stored record whose id
//! carries the source prefix. It is recomputed from the store on every sync and
//! never persisted on its own.

use chrono::{DateTime, Utc};

use crate::models::JobRecord;
use crate::store::JobStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    prefix: String,
    last_posted: Option<DateTime<Utc>>,
}

impl Watermark {
    /// No stored records yet: everything is admitted.
    pub fn empty(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            last_posted: None,
        }
    }

    pub fn at(prefix: &str, last_posted: DateTime<Utc>) -> Self {
        Self {
            prefix: prefix.to_string(),
            last_posted: Some(last_posted),
        }
    }

    /// Reads the newest record for `prefix`. Lookup errors other than
    /// "not found" are logged and treated as an empty watermark, so a flaky
    /// store degrades to a full fetch instead of a failed sync.
    pub async fn load(store: &dyn JobStore, prefix: &str) -> Self {
        match store.get_most_recent_job(prefix).await {
            Ok(job) => {
                tracing::debug!(
                    prefix,
                    job_id = %job.id,
                    posted = %job.posted_date,
                    "watermark loaded"
                );
                Self::at(prefix, job.posted_date)
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(prefix, "no stored jobs for source, fetching everything");
                Self::empty(prefix)
            }
            Err(e) => {
                tracing::warn!(prefix, error = %e, "watermark lookup failed, fetching everything");
                Self::empty(prefix)
            }
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn last_posted(&self) -> Option<DateTime<Utc>> {
        self.last_posted
    }

    /// Inclusive: a record posted exactly at the watermark is offered again and
    /// resolved by the store existence check.
    pub fn admits(&self, posted: DateTime<Utc>) -> bool {
        match self.last_posted {
            None => true,
            Some(w) => posted >= w,
        }
    }

    pub fn retain_newer(&self, records: Vec<JobRecord>) -> Vec<JobRecord> {
        records
            .into_iter()
            .filter(|r| self.admits(r.posted_date))
            .collect()
    }

    /// Whole days since the watermark (minimum 1), for APIs that filter
    /// server-side by age. `None` when there is no watermark.
    pub fn max_days_old(&self, now: DateTime<Utc>) -> Option<u32> {
        self.last_posted.map(|w| {
            let days = (now - w).num_days().max(1);
            u32::try_from(days).unwrap_or(u32::MAX)
        })
    }
}
