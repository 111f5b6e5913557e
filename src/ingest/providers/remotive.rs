// src/ingest/providers/remotive.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Months, Utc};
use metrics::histogram;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{de_string_list, de_string_or_number, finish_batch, http_client, send_for_text};
use crate::ingest::extract::{
    extract_requirements, map_employment_type, parse_date, parse_salary_range, TECH_KEYWORDS,
};
use crate::ingest::types::{Connector, ConnectorError};
use crate::ingest::watermark::Watermark;
use crate::ingest::{normalize_text, run_sync_cycle};
use crate::models::JobRecord;
use crate::store::JobStore;

pub const ID: &str = "remotive";
const PREFIX: &str = "remotive-";
const DEFAULT_BASE: &str = "https://remotive.com/api";
const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct RemotiveResponse {
    #[serde(default)]
    jobs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RemotiveJob {
    #[serde(deserialize_with = "de_string_or_number")]
    id: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    category: String,
    #[serde(default, deserialize_with = "de_string_list")]
    tags: Vec<String>,
    #[serde(default)]
    job_type: String,
    #[serde(default)]
    publication_date: String,
    #[serde(default)]
    candidate_required_location: String,
    #[serde(default)]
    salary: String,
    #[serde(default)]
    description: String,
}

pub struct RemotiveConnector {
    store: Arc<dyn JobStore>,
    client: Client,
    base_url: String,
    limit: usize,
}

impl RemotiveConnector {
    pub fn new(store: Arc<dyn JobStore>) -> Result<Self, ConnectorError> {
        Ok(Self {
            store,
            client: http_client()?,
            base_url: DEFAULT_BASE.to_string(),
            limit: DEFAULT_LIMIT,
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn parse_listing(body: &str) -> Result<Vec<JobRecord>, ConnectorError> {
        let t0 = std::time::Instant::now();
        let resp: RemotiveResponse = serde_json::from_str(body)?;

        let mut out = Vec::with_capacity(resp.jobs.len());
        for (i, item) in resp.jobs.into_iter().enumerate() {
            match serde_json::from_value::<RemotiveJob>(item) {
                Ok(j) if !j.id.is_empty() => out.push(to_record(j)),
                Ok(_) => tracing::warn!(connector = ID, index = i, "skipping listing without id"),
                Err(e) => {
                    tracing::warn!(connector = ID, index = i, error = %e, "skipping malformed listing")
                }
            }
        }

        histogram!("connector_parse_ms", "connector" => ID).record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

fn to_record(j: RemotiveJob) -> JobRecord {
    let posted = parse_date(&j.publication_date).unwrap_or_else(Utc::now);
    let salary = parse_salary_range(&j.salary, "USD");

    let description = normalize_text(&j.description);
    let description = if description.is_empty() {
        format!("Remote {} position at {}", j.title, j.company_name)
    } else {
        description
    };

    let mut rec = JobRecord::new(JobRecord::source_id(ID, &j.id), posted);
    rec.requirements = extract_requirements(&j.tags, &format!("{} {}", j.title, description), TECH_KEYWORDS);
    rec.title = j.title.trim().to_string();
    rec.company = j.company_name.trim().to_string();
    rec.description = description;
    rec.location = match j.candidate_required_location.trim() {
        "" => "Remote".to_string(),
        loc => loc.to_string(),
    };
    rec.salary = j.salary.trim().to_string();
    rec.salary_min = salary.min;
    rec.salary_max = salary.max;
    rec.salary_currency = salary.currency;
    rec.is_remote = true;
    rec.url = j.url.clone();
    rec.employment_type = map_employment_type(&j.job_type).to_string();
    rec.experience_level = "Mid-level".into();
    rec.expires_date = posted.checked_add_months(Months::new(2));
    rec.benefits = vec!["Remote work".into()];
    if let Value::Object(m) = json!({
        "source": ID,
        "source_url": j.url,
        "original_id": j.id,
        "candidate_required_location": j.candidate_required_location,
        "category": j.category,
        "tags": j.tags,
        "connector": ID,
        "fetched_at": Utc::now(),
    }) {
        rec.fields = m;
    }
    rec
}

#[async_trait]
impl Connector for RemotiveConnector {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "Remotive"
    }

    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError> {
        let watermark = Watermark::load(self.store.as_ref(), PREFIX).await;
        let url = format!("{}/remote-jobs", self.base_url);
        let body = send_for_text(
            self.client
                .get(url)
                .query(&[("limit", self.limit.to_string())]),
        )
        .await?;
        let records = Self::parse_listing(&body)?;
        Ok(finish_batch(ID, &watermark, records))
    }

    async fn sync_jobs(&self) -> Result<(), ConnectorError> {
        run_sync_cycle(self, self.store.as_ref()).await.map(|_| ())
    }
}
