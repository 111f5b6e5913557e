// src/ingest/http_plugin.rs
//! Connector that proxies a remote plugin service over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ingest::dedup_by_id;
use crate::ingest::extract::parse_date;
use crate::ingest::types::{Connector, ConnectorError};
use crate::models::JobRecord;

/// Remote scrapers may run for minutes.
pub const DEFAULT_PLUGIN_TIMEOUT: Duration = Duration::from_secs(360);

/// Response body of every plugin endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PluginEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(msg.into()),
            ..Self::default()
        }
    }

    pub fn failure(err: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(err.into()),
            ..Self::default()
        }
    }

    fn into_result(self) -> Result<Option<Value>, ConnectorError> {
        if self.success {
            Ok(self.data)
        } else {
            let msg = self
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            Err(ConnectorError::Remote(msg))
        }
    }
}

pub struct HttpPluginConnector {
    id: String,
    name: String,
    base_url: String,
    client: Client,
}

impl HttpPluginConnector {
    pub fn new(id: &str, name: &str, base_url: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_envelope(&self, resp: reqwest::Response) -> Result<PluginEnvelope, ConnectorError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ConnectorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn count_error(&self, e: &ConnectorError) {
        tracing::warn!(plugin = %self.id, url = %self.base_url, error = %e, "plugin call failed");
        counter!("plugin_http_errors_total", "plugin" => self.id.clone()).increment(1);
    }

    async fn get_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError> {
        let resp = self
            .client
            .get(format!("{}/jobs", self.base_url))
            .send()
            .await?;
        let data = self.read_envelope(resp).await?.into_result()?;
        let (records, removed) = dedup_by_id(records_from_payload(data.unwrap_or(Value::Null))?);
        if removed > 0 {
            tracing::debug!(plugin = %self.id, removed, "duplicate ids in plugin batch");
        }
        Ok(records)
    }

    async fn post_sync(&self) -> Result<(), ConnectorError> {
        let resp = self
            .client
            .post(format!("{}/sync", self.base_url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let env = self.read_envelope(resp).await?;
        if let Some(msg) = env.message.as_deref() {
            tracing::debug!(plugin = %self.id, message = msg, "plugin sync finished");
        }
        env.into_result().map(|_| ())
    }
}

#[async_trait]
impl Connector for HttpPluginConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError> {
        self.get_jobs().await.inspect_err(|e| self.count_error(e))
    }

    /// The plugin writes its own audit entry; nothing is logged here.
    async fn sync_jobs(&self) -> Result<(), ConnectorError> {
        self.post_sync().await.inspect_err(|e| self.count_error(e))
    }
}

/// Maps a `data` payload into records. The payload must be a list of objects;
/// inside each object missing or mistyped fields fall back to empty values.
pub fn records_from_payload(data: Value) -> Result<Vec<JobRecord>, ConnectorError> {
    let Value::Array(items) = data else {
        return Err(ConnectorError::Shape(format!(
            "expected a list of jobs, got {}",
            kind(&data)
        )));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(obj) => Ok(record_from_object(&obj)),
            other => Err(ConnectorError::Shape(format!(
                "job #{i} is {}, not an object",
                kind(&other)
            ))),
        })
        .collect()
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn record_from_object(obj: &Map<String, Value>) -> JobRecord {
    let text = |k: &str| obj.get(k).and_then(Value::as_str).map(str::to_string).unwrap_or_default();
    let int = |k: &str| match obj.get(k) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        _ => None,
    };
    let date = |k: &str| obj.get(k).and_then(Value::as_str).and_then(parse_date);
    let strings = |k: &str| -> Vec<String> {
        obj.get(k)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };

    let mut rec = JobRecord::new(text("id"), date("posted_date").unwrap_or_else(Utc::now));
    rec.title = text("title");
    rec.company = text("company");
    rec.description = text("description");
    rec.location = text("location");
    rec.salary = text("salary");
    rec.salary_min = int("salary_min");
    rec.salary_max = int("salary_max");
    rec.salary_currency = text("salary_currency");
    rec.is_remote = obj.get("is_remote").and_then(Value::as_bool).unwrap_or(false);
    rec.url = text("url");
    rec.employment_type = text("employment_type");
    rec.experience_level = text("experience_level");
    rec.expires_date = date("expires_date");
    rec.requirements = strings("requirements");
    rec.benefits = strings("benefits");
    if let Some(Value::Object(fields)) = obj.get("fields") {
        rec.fields = fields.clone();
    }
    rec
}
