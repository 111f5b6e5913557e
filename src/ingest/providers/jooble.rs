// src/ingest/providers/jooble.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use metrics::histogram;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{de_string_or_number, finish_batch, http_client, send_for_text};
use crate::ingest::extract::{
    detect_remote, extract_requirements, map_employment_type, parse_date, MARKET_KEYWORDS,
    TECH_KEYWORDS,
};
use crate::ingest::types::{Connector, ConnectorError};
use crate::ingest::watermark::Watermark;
use crate::ingest::{collect_pages, normalize_text, run_sync_cycle};
use crate::models::JobRecord;
use crate::store::JobStore;

pub const ID: &str = "jooble";
const PREFIX: &str = "jooble-";
const DEFAULT_BASE: &str = "https://jooble.org/api";
const DEFAULT_LOCATION: &str = "Stockholm";
const QUERY_PAUSE: Duration = Duration::from_secs(2);

pub const DEFAULT_QUERIES: &[&str] = &[
    "developer",
    "engineer",
    "designer",
    "manager",
    "sales",
    "marketing",
];

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    keywords: &'a str,
    location: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, rename = "totalCount")]
    total_count: u64,
    #[serde(default)]
    jobs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct JoobleJob {
    #[serde(default, deserialize_with = "de_string_or_number")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    salary: String,
    #[serde(default)]
    source: String,
    #[serde(default, rename = "type")]
    job_type: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    updated: String,
}

pub struct JoobleConnector {
    store: Arc<dyn JobStore>,
    client: Client,
    api_key: String,
    base_url: String,
    location: String,
    queries: Vec<String>,
    query_pause: Duration,
}

impl JoobleConnector {
    /// An empty key is accepted here; fetching without one is a
    /// configuration error.
    pub fn new(store: Arc<dyn JobStore>, api_key: &str) -> Result<Self, ConnectorError> {
        Ok(Self {
            store,
            client: http_client()?,
            api_key: api_key.trim().to_string(),
            base_url: DEFAULT_BASE.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            queries: DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect(),
            query_pause: QUERY_PAUSE,
        })
    }

    /// `None` when `JOOBLE_API_KEY` is unset or empty.
    pub fn from_env(store: Arc<dyn JobStore>) -> Result<Option<Self>, ConnectorError> {
        match std::env::var("JOOBLE_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Self::new(store, &key).map(Some),
            _ => Ok(None),
        }
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    pub fn with_queries(mut self, queries: &[&str]) -> Self {
        self.queries = queries.iter().map(|q| q.to_string()).collect();
        self
    }

    pub fn with_query_pause(mut self, pause: Duration) -> Self {
        self.query_pause = pause;
        self
    }

    /// Parses one search response. `now` anchors the fallback posted date.
    pub fn parse_search(body: &str, now: DateTime<Utc>) -> Result<Vec<JobRecord>, ConnectorError> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse = serde_json::from_str(body)?;
        tracing::debug!(connector = ID, total_count = resp.total_count, page = resp.jobs.len(), "search page");

        let mut out = Vec::with_capacity(resp.jobs.len());
        for (i, item) in resp.jobs.into_iter().enumerate() {
            match serde_json::from_value::<JoobleJob>(item) {
                Ok(j) => match to_record(j, now) {
                    Some(rec) => out.push(rec),
                    None => tracing::warn!(connector = ID, index = i, "skipping listing without id or link"),
                },
                Err(e) => tracing::warn!(connector = ID, index = i, error = %e, "skipping malformed listing"),
            }
        }

        histogram!("connector_parse_ms", "connector" => ID).record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }

    async fn search(&self, keywords: &str) -> Result<Vec<JobRecord>, ConnectorError> {
        let body = send_for_text(
            self.client
                .post(format!("{}/{}", self.base_url, self.api_key))
                .json(&SearchRequest {
                    keywords,
                    location: &self.location,
                }),
        )
        .await?;
        Self::parse_search(&body, Utc::now())
    }
}

/// Native id when present, else a stable digest of the link.
pub fn native_id(raw_id: &str, link: &str) -> Option<String> {
    let id = raw_id.trim();
    if !id.is_empty() && id != "0" {
        return Some(id.to_string());
    }
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    let digest = Sha256::digest(link.as_bytes());
    Some(digest.iter().take(8).map(|b| format!("{b:02x}")).collect())
}

fn format_location(raw: &str) -> String {
    let loc = raw.trim();
    if loc.is_empty() {
        return "Sweden".to_string();
    }
    let lower = loc.to_lowercase();
    if lower.contains("sweden") || lower.contains("sverige") {
        loc.to_string()
    } else {
        format!("{loc}, Sweden")
    }
}

fn to_record(j: JoobleJob, now: DateTime<Utc>) -> Option<JobRecord> {
    let native = native_id(&j.id, &j.link)?;
    // Listings without a date are assumed to be about a week old.
    let posted = parse_date(&j.updated).unwrap_or_else(|| now - chrono::Duration::days(7));
    let description = normalize_text(&j.snippet);
    let keywords: Vec<&str> = TECH_KEYWORDS.iter().chain(MARKET_KEYWORDS).copied().collect();

    let mut rec = JobRecord::new(JobRecord::source_id(ID, &native), posted);
    rec.is_remote = detect_remote(&[j.title.as_str(), description.as_str(), j.location.as_str()]);
    rec.requirements = extract_requirements(&[], &format!("{} {}", j.title, description), &keywords);
    rec.title = normalize_text(&j.title);
    rec.company = j.company.trim().to_string();
    rec.description = description;
    rec.location = format_location(&j.location);
    rec.salary = j.salary.trim().to_string();
    rec.salary_currency = "SEK".into();
    rec.url = j.link.clone();
    rec.employment_type = map_employment_type(&j.job_type).to_string();
    rec.experience_level = "Mid-level".into();
    rec.expires_date = posted.checked_add_months(Months::new(1));
    if let Value::Object(m) = json!({
        "source": ID,
        "source_url": j.link,
        "original_id": native,
        "connector": ID,
        "jooble_source": j.source,
        "jooble_type": j.job_type,
        "fetched_at": now,
    }) {
        rec.fields = m;
    }
    Some(rec)
}

#[async_trait]
impl Connector for JoobleConnector {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "Jooble"
    }

    /// One search per query with a pause in between. The same listing
    /// returned by two queries is kept once.
    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError> {
        if self.api_key.is_empty() {
            return Err(ConnectorError::Config("JOOBLE_API_KEY is not set".into()));
        }
        let watermark = Watermark::load(self.store.as_ref(), PREFIX).await;
        let records = collect_pages(ID, &self.queries, self.query_pause, |q| {
            let q = q.clone();
            async move {
                tracing::debug!(connector = ID, query = %q, "searching");
                self.search(&q).await
            }
        })
        .await?;
        Ok(finish_batch(ID, &watermark, records))
    }

    async fn sync_jobs(&self) -> Result<(), ConnectorError> {
        run_sync_cycle(self, self.store.as_ref()).await.map(|_| ())
    }
}
