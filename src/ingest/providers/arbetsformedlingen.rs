// src/ingest/providers/arbetsformedlingen.rs
//! Swedish Public Employment Service (JobTech search API).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::histogram;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{de_string_or_number, finish_batch, http_client, send_for_text};
use crate::ingest::extract::{detect_remote, map_employment_type, parse_date, parse_salary_range};
use crate::ingest::types::{Connector, ConnectorError};
use crate::ingest::watermark::Watermark;
use crate::ingest::{collect_pages, normalize_text, run_sync_cycle};
use crate::models::JobRecord;
use crate::store::JobStore;

pub const ID: &str = "arbetsformedlingen";
const PREFIX: &str = "af-";
const DEFAULT_BASE: &str = "https://jobsearch.api.jobtechdev.se";
const QUERY: &str = "utvecklare OR programmerare OR developer OR software";
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 5;
const PAGE_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: Total,
    #[serde(default)]
    hits: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Total {
    #[serde(default)]
    value: usize,
}

#[derive(Debug, Default, Deserialize)]
struct Labelled {
    #[serde(default, alias = "concept_label")]
    label: String,
}

#[derive(Debug, Default, Deserialize)]
struct TextBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Employer {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    #[serde(default)]
    municipality: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InfoBlock {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApplicationDetails {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    information: Vec<InfoBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct Link {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct MustHave {
    #[serde(default)]
    skills: Vec<Labelled>,
}

#[derive(Debug, Deserialize)]
struct AfJob {
    #[serde(deserialize_with = "de_string_or_number")]
    id: String,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    description: Option<TextBlock>,
    #[serde(default)]
    employer: Option<Employer>,
    #[serde(default)]
    workplace_address: Option<Address>,
    #[serde(default)]
    salary_description: Option<String>,
    #[serde(default)]
    employment_type: Option<Labelled>,
    #[serde(default)]
    experience_required: bool,
    #[serde(default)]
    application_details: Option<ApplicationDetails>,
    #[serde(default)]
    publication_date: String,
    #[serde(default)]
    last_application_date: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    source_links: Vec<Link>,
    #[serde(default)]
    must_have: Option<MustHave>,
}

pub struct ArbetsformedlingenConnector {
    store: Arc<dyn JobStore>,
    client: Client,
    base_url: String,
    page_size: usize,
    max_pages: usize,
    page_pause: Duration,
}

impl ArbetsformedlingenConnector {
    pub fn new(store: Arc<dyn JobStore>) -> Result<Self, ConnectorError> {
        Ok(Self {
            store,
            client: http_client()?,
            base_url: DEFAULT_BASE.to_string(),
            page_size: PAGE_SIZE,
            max_pages: MAX_PAGES,
            page_pause: PAGE_PAUSE,
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_paging(mut self, page_size: usize, max_pages: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_page_pause(mut self, pause: Duration) -> Self {
        self.page_pause = pause;
        self
    }

    /// Parses one search page. Returns the records and the total hit count
    /// the API reports for the query.
    pub fn parse_page(body: &str) -> Result<(Vec<JobRecord>, usize), ConnectorError> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse = serde_json::from_str(body)?;

        let mut out = Vec::with_capacity(resp.hits.len());
        for (i, hit) in resp.hits.into_iter().enumerate() {
            match serde_json::from_value::<AfJob>(hit) {
                Ok(j) if !j.id.is_empty() => out.push(to_record(j)),
                Ok(_) => tracing::warn!(connector = ID, index = i, "skipping hit without id"),
                Err(e) => tracing::warn!(connector = ID, index = i, error = %e, "skipping malformed hit"),
            }
        }

        histogram!("connector_parse_ms", "connector" => ID).record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok((out, resp.total.value))
    }

    async fn fetch_page(&self, offset: usize, watermark: &Watermark) -> Result<(Vec<JobRecord>, usize), ConnectorError> {
        let mut query = vec![
            ("q", QUERY.to_string()),
            ("offset", offset.to_string()),
            ("limit", self.page_size.to_string()),
            ("sort", "pubdate-desc".to_string()),
        ];
        if let Some(since) = watermark.last_posted() {
            query.push(("published-after", since.format("%Y-%m-%dT%H:%M:%S").to_string()));
        }
        let body = send_for_text(
            self.client
                .get(format!("{}/search", self.base_url))
                .query(&query),
        )
        .await?;
        Self::parse_page(&body)
    }
}

fn format_location(addr: &Address) -> String {
    [&addr.municipality, &addr.region, &addr.country]
        .into_iter()
        .filter_map(|p| p.as_deref().map(str::trim))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_record(j: AfJob) -> JobRecord {
    let posted = parse_date(&j.publication_date).unwrap_or_else(Utc::now);
    let details = j.application_details.unwrap_or_default();
    let addr = j.workplace_address.unwrap_or_default();
    let location = format_location(&addr);

    let mut description = normalize_text(&j.description.map(|d| d.text).unwrap_or_default());
    for info in &details.information {
        if !info.headline.is_empty() && !info.text.is_empty() {
            description.push_str(&format!("\n\n{}: {}", info.headline, normalize_text(&info.text)));
        }
    }
    let description = description.trim().to_string();

    let mut requirements = Vec::new();
    if j.experience_required {
        requirements.push("Work experience required".to_string());
    }
    if let Some(must) = &j.must_have {
        requirements.extend(must.skills.iter().map(|s| s.label.trim().to_string()).filter(|s| !s.is_empty()));
    }
    let mut benefits = Vec::new();
    for info in &details.information {
        let h = info.headline.to_lowercase();
        if h.contains("krav") || h.contains("requirement") {
            requirements.push(info.text.clone());
        } else if h.contains("förmån") || h.contains("benefit") {
            benefits.push(info.text.clone());
        }
    }

    let url = j
        .source_links
        .first()
        .map(|l| l.url.clone())
        .filter(|u| !u.is_empty())
        .or(j.webpage_url.clone())
        .or(details.url.clone())
        .unwrap_or_else(|| format!("https://arbetsformedlingen.se/platsbanken/annonser/{}", j.id));

    let salary_raw = j.salary_description.unwrap_or_default();
    let salary = parse_salary_range(&salary_raw, "SEK");
    let employment = j.employment_type.map(|e| e.label).unwrap_or_default();

    let mut rec = JobRecord::new(JobRecord::source_id("af", &j.id), posted);
    rec.is_remote = detect_remote(&[location.as_str(), description.as_str(), j.headline.as_str()]);
    rec.title = j.headline.trim().to_string();
    rec.company = j.employer.map(|e| e.name.trim().to_string()).unwrap_or_default();
    rec.description = description;
    rec.location = location;
    rec.salary = salary_raw.trim().to_string();
    rec.salary_min = salary.min;
    rec.salary_max = salary.max;
    rec.salary_currency = salary.currency;
    rec.url = url.clone();
    rec.employment_type = map_employment_type(&employment).to_string();
    rec.experience_level = if j.experience_required { "Mid-level" } else { "Entry-level" }.into();
    rec.expires_date = j.last_application_date.as_deref().and_then(parse_date);
    rec.requirements = requirements;
    rec.benefits = benefits;
    if let Value::Object(m) = json!({
        "source": ID,
        "source_url": url,
        "original_id": j.id,
        "employment_type": employment,
        "connector": ID,
        "fetched_at": Utc::now(),
    }) {
        rec.fields = m;
    }
    rec
}

#[async_trait]
impl Connector for ArbetsformedlingenConnector {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "Arbetsförmedlingen"
    }

    /// Page one decides how many further pages exist (bounded by
    /// `max_pages`). Later page failures are skipped.
    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError> {
        let watermark = Watermark::load(self.store.as_ref(), PREFIX).await;

        let (mut records, total) = self.fetch_page(0, &watermark).await?;
        let reachable = total.min(self.page_size * self.max_pages);
        let offsets: Vec<usize> = (self.page_size..reachable).step_by(self.page_size).collect();
        tracing::debug!(connector = ID, total, extra_pages = offsets.len(), "paging search results");

        if !offsets.is_empty() {
            tokio::time::sleep(self.page_pause).await;
            match collect_pages(ID, &offsets, self.page_pause, |offset| {
                let offset = *offset;
                let watermark = &watermark;
                async move { self.fetch_page(offset, watermark).await.map(|(recs, _)| recs) }
            })
            .await
            {
                Ok(mut more) => records.append(&mut more),
                Err(e) => tracing::warn!(connector = ID, error = %e, "keeping first page only"),
            }
        }

        Ok(finish_batch(ID, &watermark, records))
    }

    async fn sync_jobs(&self) -> Result<(), ConnectorError> {
        run_sync_cycle(self, self.store.as_ref()).await.map(|_| ())
    }
}
