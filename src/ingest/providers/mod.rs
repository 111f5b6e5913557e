// src/ingest/providers/mod.rs
//! Built-in source connectors.

pub mod arbetsformedlingen;
pub mod eures;
pub mod jooble;
pub mod remoteok;
pub mod remotive;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::ingest::registry::PluginRegistry;
use crate::ingest::types::{Connector, ConnectorError};
use crate::ingest::watermark::Watermark;
use crate::ingest::dedup_by_id;
use crate::models::JobRecord;
use crate::store::JobStore;

pub use arbetsformedlingen::ArbetsformedlingenConnector;
pub use eures::EuresConnector;
pub use jooble::JoobleConnector;
pub use remoteok::RemoteOkConnector;
pub use remotive::RemotiveConnector;

/// Direct source APIs answer quickly; plugin calls get a longer budget.
pub const SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("openjobs-ingest/", env!("CARGO_PKG_VERSION"));

pub(crate) fn http_client() -> Result<Client, ConnectorError> {
    Ok(Client::builder()
        .timeout(SOURCE_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Sends the request and returns the body, turning non-2xx into
/// [`ConnectorError::Status`] with the body attached.
pub(crate) async fn send_for_text(rb: RequestBuilder) -> Result<String, ConnectorError> {
    let resp = rb.header(reqwest::header::ACCEPT, "application/json").send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ConnectorError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Applies the watermark and in-batch dedup to a freshly parsed batch.
pub(crate) fn finish_batch(connector: &str, watermark: &Watermark, records: Vec<JobRecord>) -> Vec<JobRecord> {
    let total = records.len();
    let fresh = watermark.retain_newer(records);
    let older = total - fresh.len();
    let (unique, repeated) = dedup_by_id(fresh);
    tracing::info!(
        connector,
        total,
        older_than_watermark = older,
        repeated_in_batch = repeated,
        kept = unique.len(),
        "batch filtered"
    );
    unique
}

/// Accepts `"123"`, `123` or `null` for id-like fields.
pub(crate) fn de_string_or_number<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Strings inside a list, ignoring anything else; non-lists become empty.
pub(crate) fn de_string_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Registers the connectors that run in-process. Jooble joins only when
/// `JOOBLE_API_KEY` is set, EURES only with both Adzuna credentials.
pub fn register_builtin(registry: &PluginRegistry, store: Arc<dyn JobStore>) -> Result<(), ConnectorError> {
    registry.register(Arc::new(ArbetsformedlingenConnector::new(store.clone())?));
    registry.register(Arc::new(RemoteOkConnector::new(store.clone())?));
    registry.register(Arc::new(RemotiveConnector::new(store.clone())?));
    match EuresConnector::from_env(store.clone())? {
        Some(e) => {
            registry.register(Arc::new(e));
        }
        None => tracing::info!("ADZUNA_APP_ID/ADZUNA_APP_KEY not set; eures connector disabled"),
    }
    match JoobleConnector::from_env(store)? {
        Some(j) => {
            registry.register(Arc::new(j));
        }
        None => tracing::info!("JOOBLE_API_KEY not set; jooble connector disabled"),
    }
    Ok(())
}

/// Builds a single connector by id, for running it as a plugin service.
pub fn build_connector(id: &str, store: Arc<dyn JobStore>) -> Result<Arc<dyn Connector>, ConnectorError> {
    let c: Arc<dyn Connector> = match id {
        arbetsformedlingen::ID => Arc::new(ArbetsformedlingenConnector::new(store)?),
        remoteok::ID => Arc::new(RemoteOkConnector::new(store)?),
        remotive::ID => Arc::new(RemotiveConnector::new(store)?),
        eures::ID => Arc::new(EuresConnector::new(
            store,
            &std::env::var("ADZUNA_APP_ID").unwrap_or_default(),
            &std::env::var("ADZUNA_APP_KEY").unwrap_or_default(),
        )?),
        jooble::ID => Arc::new(JoobleConnector::new(
            store,
            &std::env::var("JOOBLE_API_KEY").unwrap_or_default(),
        )?),
        other => {
            return Err(ConnectorError::Config(format!(
                "unknown connector '{other}' (expected one of: {})",
                BUILTIN_IDS.join(", ")
            )))
        }
    };
    Ok(c)
}

pub const BUILTIN_IDS: &[&str] = &[
    arbetsformedlingen::ID,
    eures::ID,
    jooble::ID,
    remoteok::ID,
    remotive::ID,
];
