// src/ingest/providers/remoteok.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Months, Utc};
use metrics::histogram;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{de_string_list, de_string_or_number, finish_batch, http_client, send_for_text};
use crate::ingest::extract::{extract_requirements, parse_date, TECH_KEYWORDS};
use crate::ingest::types::{Connector, ConnectorError};
use crate::ingest::watermark::Watermark;
use crate::ingest::{normalize_text, run_sync_cycle};
use crate::models::JobRecord;
use crate::store::JobStore;

pub const ID: &str = "remoteok";
const PREFIX: &str = "remoteok-";
const DEFAULT_URL: &str = "https://remoteok.com/api";

#[derive(Debug, Deserialize)]
struct RemoteOkJob {
    #[serde(default, deserialize_with = "de_string_or_number")]
    id: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    position: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    company_logo: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
    #[serde(default, deserialize_with = "de_string_list")]
    tags: Vec<String>,
    #[serde(default)]
    date: String,
    #[serde(default)]
    epoch: Option<i64>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    apply_url: String,
    #[serde(default)]
    salary_min: Option<i64>,
    #[serde(default)]
    salary_max: Option<i64>,
}

pub struct RemoteOkConnector {
    store: Arc<dyn JobStore>,
    client: Client,
    url: String,
}

impl RemoteOkConnector {
    pub fn new(store: Arc<dyn JobStore>) -> Result<Self, ConnectorError> {
        Ok(Self {
            store,
            client: http_client()?,
            url: DEFAULT_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// Parses the API body. The first element of the array is a legal notice,
    /// not a job.
    pub fn parse_listing(body: &str) -> Result<Vec<JobRecord>, ConnectorError> {
        let t0 = std::time::Instant::now();
        let items: Vec<Value> = serde_json::from_str(body)?;

        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            if i == 0 && (item.get("legal").is_some() || item.get("position").is_none()) {
                continue;
            }
            let job: RemoteOkJob = match serde_json::from_value(item) {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!(connector = ID, index = i, error = %e, "skipping malformed listing");
                    continue;
                }
            };
            if job.id.is_empty() {
                continue;
            }
            out.push(to_record(job));
        }

        histogram!("connector_parse_ms", "connector" => ID).record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

fn to_record(j: RemoteOkJob) -> JobRecord {
    let posted = parse_date(&j.date)
        .or_else(|| j.epoch.and_then(|e| parse_date(&e.to_string())))
        .unwrap_or_else(Utc::now);

    let url = if !j.url.is_empty() {
        j.url.clone()
    } else if !j.slug.is_empty() {
        format!("https://remoteok.com/remote-jobs/{}", j.slug)
    } else {
        format!("https://remoteok.com/remote-jobs/{}", j.id)
    };

    let description = normalize_text(&j.description);
    let description = if description.is_empty() {
        format!("Remote {} position at {}", j.position, j.company)
    } else {
        description
    };

    let location = match j.location.trim() {
        "" | "Remote" => "Remote".to_string(),
        other => format!("{other} (Remote)"),
    };

    let mut rec = JobRecord::new(JobRecord::source_id(ID, &j.id), posted);
    rec.requirements = extract_requirements(&j.tags, &format!("{} {}", j.position, description), TECH_KEYWORDS);
    rec.title = j.position.trim().to_string();
    rec.company = j.company.trim().to_string();
    rec.description = description;
    rec.location = location;
    rec.salary_min = j.salary_min.filter(|v| *v > 0);
    rec.salary_max = j.salary_max.filter(|v| *v > 0);
    rec.salary = match (rec.salary_min, rec.salary_max) {
        (Some(lo), Some(hi)) => format!("${lo} - ${hi}"),
        (Some(v), None) | (None, Some(v)) => format!("${v}"),
        (None, None) => String::new(),
    };
    rec.salary_currency = "USD".into();
    rec.is_remote = true;
    rec.url = url.clone();
    rec.employment_type = "Full-time".into();
    rec.experience_level = "Mid-level".into();
    rec.expires_date = posted.checked_add_months(Months::new(2));
    rec.benefits = vec!["Remote work".into()];
    if let Value::Object(m) = json!({
        "source": ID,
        "source_url": url,
        "original_id": j.id,
        "slug": j.slug,
        "tags": j.tags,
        "company_logo": j.company_logo,
        "apply_url": j.apply_url,
        "connector": ID,
        "fetched_at": Utc::now(),
    }) {
        rec.fields = m;
    }
    rec
}

#[async_trait]
impl Connector for RemoteOkConnector {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "RemoteOK"
    }

    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError> {
        let watermark = Watermark::load(self.store.as_ref(), PREFIX).await;
        let body = send_for_text(self.client.get(&self.url)).await?;
        let records = Self::parse_listing(&body)?;
        Ok(finish_batch(ID, &watermark, records))
    }

    async fn sync_jobs(&self) -> Result<(), ConnectorError> {
        run_sync_cycle(self, self.store.as_ref()).await.map(|_| ())
    }
}
