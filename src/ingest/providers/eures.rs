// src/ingest/providers/eures.rs
//! European listings through the Adzuna search API, one sub-query per country.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use metrics::histogram;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{de_string_or_number, finish_batch, http_client, send_for_text};
use crate::ingest::extract::{
    detect_remote, extract_requirements, map_employment_type, parse_date, TECH_KEYWORDS,
};
use crate::ingest::types::{Connector, ConnectorError};
use crate::ingest::watermark::Watermark;
use crate::ingest::{collect_pages, normalize_text, run_sync_cycle};
use crate::models::JobRecord;
use crate::store::JobStore;

pub const ID: &str = "eures";
const SOURCE: &str = "adzuna";
const PREFIX: &str = "adzuna-";
const DEFAULT_BASE: &str = "https://api.adzuna.com/v1/api/jobs";
const WHAT: &str = "developer OR programmer OR software";
const RESULTS_PER_PAGE: u32 = 100;
const COUNTRY_PAUSE: Duration = Duration::from_secs(1);

/// European markets the Adzuna API serves.
pub const DEFAULT_COUNTRIES: &[&str] = &["de", "nl", "at", "ch", "be", "fr", "es", "it", "pl", "gb"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct DisplayName {
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Area {
    #[serde(default)]
    area: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaJob {
    #[serde(default, deserialize_with = "de_string_or_number")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    company: DisplayName,
    #[serde(default)]
    location: Area,
    #[serde(default)]
    salary_min: Option<f64>,
    #[serde(default)]
    salary_max: Option<f64>,
    #[serde(default)]
    contract_type: String,
    #[serde(default)]
    contract_time: String,
    #[serde(default)]
    created: String,
    #[serde(default)]
    redirect_url: String,
}

pub struct EuresConnector {
    store: Arc<dyn JobStore>,
    client: Client,
    app_id: String,
    app_key: String,
    base_url: String,
    countries: Vec<String>,
    country_pause: Duration,
}

impl EuresConnector {
    /// Empty credentials are accepted here; fetching without them is a
    /// configuration error.
    pub fn new(store: Arc<dyn JobStore>, app_id: &str, app_key: &str) -> Result<Self, ConnectorError> {
        Ok(Self {
            store,
            client: http_client()?,
            app_id: app_id.trim().to_string(),
            app_key: app_key.trim().to_string(),
            base_url: DEFAULT_BASE.to_string(),
            countries: DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect(),
            country_pause: COUNTRY_PAUSE,
        })
    }

    /// `None` unless both `ADZUNA_APP_ID` and `ADZUNA_APP_KEY` are set.
    pub fn from_env(store: Arc<dyn JobStore>) -> Result<Option<Self>, ConnectorError> {
        let id = std::env::var("ADZUNA_APP_ID").unwrap_or_default();
        let key = std::env::var("ADZUNA_APP_KEY").unwrap_or_default();
        if id.trim().is_empty() || key.trim().is_empty() {
            return Ok(None);
        }
        Self::new(store, &id, &key).map(Some)
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_countries(mut self, countries: &[&str]) -> Self {
        self.countries = countries.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_country_pause(mut self, pause: Duration) -> Self {
        self.country_pause = pause;
        self
    }

    /// Parses one country's search response. `now` anchors the fallback
    /// posted date.
    pub fn parse_search(body: &str, country: &str, now: DateTime<Utc>) -> Result<Vec<JobRecord>, ConnectorError> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse = serde_json::from_str(body)?;
        tracing::debug!(connector = ID, country, count = resp.count, page = resp.results.len(), "search page");

        let mut out = Vec::with_capacity(resp.results.len());
        for (i, item) in resp.results.into_iter().enumerate() {
            match serde_json::from_value::<AdzunaJob>(item) {
                Ok(j) if j.id.is_empty() => {
                    tracing::warn!(connector = ID, country, index = i, "skipping listing without id")
                }
                Ok(j) => out.push(to_record(j, country, now)),
                Err(e) => tracing::warn!(connector = ID, country, index = i, error = %e, "skipping malformed listing"),
            }
        }

        histogram!("connector_parse_ms", "connector" => ID).record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }

    async fn search_country(&self, country: &str, max_days_old: Option<u32>) -> Result<Vec<JobRecord>, ConnectorError> {
        let mut query = vec![
            ("app_id", self.app_id.clone()),
            ("app_key", self.app_key.clone()),
            ("results_per_page", RESULTS_PER_PAGE.to_string()),
            ("what", WHAT.to_string()),
        ];
        if let Some(days) = max_days_old {
            query.push(("max_days_old", days.to_string()));
        }
        let body = send_for_text(
            self.client
                .get(format!("{}/{country}/search/1", self.base_url))
                .query(&query),
        )
        .await?;
        Self::parse_search(&body, country, Utc::now())
    }
}

/// Adzuna quotes salaries in the market's own currency.
fn currency_for(country: &str) -> &'static str {
    match country {
        "gb" => "GBP",
        "ch" => "CHF",
        "pl" => "PLN",
        _ => "EUR",
    }
}

fn salary_text(min: Option<i64>, max: Option<i64>, currency: &str) -> String {
    let amount = |v: i64| match currency {
        "EUR" => format!("€{v}"),
        "GBP" => format!("£{v}"),
        other => format!("{other} {v}"),
    };
    match (min, max) {
        (Some(lo), Some(hi)) => format!("{} - {}", amount(lo), amount(hi)),
        (Some(lo), None) => format!("{}+", amount(lo)),
        (None, Some(hi)) => format!("Up to {}", amount(hi)),
        (None, None) => String::new(),
    }
}

fn positive(v: Option<f64>) -> Option<i64> {
    v.filter(|v| *v > 0.0).map(|v| v.round() as i64)
}

fn to_record(j: AdzunaJob, country: &str, now: DateTime<Utc>) -> JobRecord {
    let posted = parse_date(&j.created).unwrap_or(now);
    let title = normalize_text(&j.title);
    let description = normalize_text(&j.description);

    let mut rec = JobRecord::new(JobRecord::source_id(SOURCE, &j.id), posted);
    rec.requirements = extract_requirements(&[], &format!("{title} {description}"), TECH_KEYWORDS);
    rec.is_remote = detect_remote(&[title.as_str(), description.as_str()]);
    rec.title = title;
    rec.company = j.company.display_name.trim().to_string();
    rec.description = description;
    rec.location = j.location.area.join(", ");
    rec.salary_min = positive(j.salary_min);
    rec.salary_max = positive(j.salary_max);
    if rec.salary_min.is_some() || rec.salary_max.is_some() {
        let currency = currency_for(country);
        rec.salary = salary_text(rec.salary_min, rec.salary_max, currency);
        rec.salary_currency = currency.to_string();
    }
    rec.url = j.redirect_url.clone();
    rec.employment_type = map_employment_type(&j.contract_time).to_string();
    rec.experience_level = "Mid-level".into();
    rec.expires_date = posted.checked_add_months(Months::new(1));
    if let Value::Object(m) = json!({
        "source": SOURCE,
        "source_url": j.redirect_url,
        "original_id": j.id,
        "contract_type": j.contract_type,
        "contract_time": j.contract_time,
        "location_area": j.location.area,
        "country": country,
        "connector": ID,
        "fetched_at": now,
    }) {
        rec.fields = m;
    }
    rec
}

#[async_trait]
impl Connector for EuresConnector {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "EURES (Adzuna)"
    }

    /// One search per country with a pause in between. A failing country is
    /// skipped; the fetch fails only when every country failed.
    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError> {
        if self.app_id.is_empty() || self.app_key.is_empty() {
            return Err(ConnectorError::Config(
                "ADZUNA_APP_ID and ADZUNA_APP_KEY must both be set".into(),
            ));
        }
        let watermark = Watermark::load(self.store.as_ref(), PREFIX).await;
        let max_days_old = watermark.max_days_old(Utc::now());
        if let Some(days) = max_days_old {
            tracing::info!(connector = ID, max_days_old = days, "incremental fetch");
        }
        let records = collect_pages(ID, &self.countries, self.country_pause, |country| {
            let country = country.clone();
            async move { self.search_country(&country, max_days_old).await }
        })
        .await?;
        Ok(finish_batch(ID, &watermark, records))
    }

    async fn sync_jobs(&self) -> Result<(), ConnectorError> {
        run_sync_cycle(self, self.store.as_ref()).await.map(|_| ())
    }
}
