// src/store/supabase.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};

use super::{JobStore, StoreError};
use crate::audit::SyncAttempt;
use crate::models::JobRecord;

const JOBS_TABLE: &str = "job_posts";
const SYNC_LOG_TABLE: &str = "sync_logs";

/// PostgREST-backed store (Supabase `rest/v1`).
pub struct SupabaseJobStore {
    base_url: String,
    api_key: String,
    client: Client,
}

impl SupabaseJobStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    /// `None` when `SUPABASE_URL` is unset.
    pub fn from_env() -> Result<Option<Self>, StoreError> {
        let Ok(url) = std::env::var("SUPABASE_URL") else {
            return Ok(None);
        };
        if url.trim().is_empty() {
            return Ok(None);
        }
        let key = std::env::var("SUPABASE_ANON_KEY").unwrap_or_default();
        Self::new(&url, &key).map(Some)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn select_one(&self, table: &str, query: &[(&str, String)]) -> Result<Option<JobRecord>, StoreError> {
        let resp = self
            .authed(self.client.get(self.table_url(table)))
            .query(query)
            .send()
            .await?;
        let rows: Vec<JobRecord> = read_json(resp).await?;
        Ok(rows.into_iter().next())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, StoreError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(StoreError::Backend(format!("postgrest status {status}: {body}")));
    }
    Ok(serde_json::from_str(&body)?)
}

async fn expect_success(resp: reqwest::Response, id: &str) -> Result<(), StoreError> {
    let status = resp.status();
    if status == StatusCode::CONFLICT {
        return Err(StoreError::AlreadyExists(id.to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Backend(format!("postgrest status {status}: {body}")));
    }
    Ok(())
}

/// PostgREST `like` pattern; `*` is its wildcard.
fn prefix_pattern(prefix: &str) -> String {
    format!("like.{}*", prefix.replace('*', ""))
}

#[async_trait]
impl JobStore for SupabaseJobStore {
    async fn create_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let resp = self
            .authed(self.client.post(self.table_url(JOBS_TABLE)))
            .header("Prefer", "return=minimal")
            .json(job)
            .send()
            .await?;
        expect_success(resp, &job.id).await
    }

    async fn get_job(&self, id: &str) -> Result<JobRecord, StoreError> {
        self.select_one(JOBS_TABLE, &[("id", format!("eq.{id}"))])
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_most_recent_job(&self, id_prefix: &str) -> Result<JobRecord, StoreError> {
        let query = [
            ("id", prefix_pattern(id_prefix)),
            ("order", "posted_date.desc".to_string()),
            ("limit", "1".to_string()),
        ];
        self.select_one(JOBS_TABLE, &query)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("no jobs with prefix {id_prefix}")))
    }

    async fn log_sync(&self, attempt: &SyncAttempt) -> Result<(), StoreError> {
        let resp = self
            .authed(self.client.post(self.table_url(SYNC_LOG_TABLE)))
            .header("Prefer", "return=minimal")
            .json(attempt)
            .send()
            .await?;
        expect_success(resp, &attempt.connector_name).await
    }

    async fn get_recent_sync_logs(&self, limit: usize) -> Result<Vec<SyncAttempt>, StoreError> {
        let resp = self
            .authed(self.client.get(self.table_url(SYNC_LOG_TABLE)))
            .query(&[
                ("order", "started_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        read_json(resp).await
    }
}
