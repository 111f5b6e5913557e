//! Unified job record and connector identity shared by every source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A job posting normalized from any source.
///
/// `id` is namespaced by source (`"<source>-<native-id>"`), so two sources can
/// never collide. `posted_date` is always populated and doubles as the
/// incremental-fetch watermark for the source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub title: String,
    pub company: String,
    pub description: String,
    pub location: String,
    /// Compensation exactly as the source printed it.
    pub salary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub salary_currency: String,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub employment_type: String,
    #[serde(default)]
    pub experience_level: String,
    pub posted_date: DateTime<Utc>,
    #[serde(default)]
    pub expires_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    /// Source-specific metadata (original id, tags, fetched_at, ...).
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl JobRecord {
    /// Empty record with only the id and posted date set.
    pub fn new(id: impl Into<String>, posted_date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            company: String::new(),
            description: String::new(),
            location: String::new(),
            salary: String::new(),
            salary_min: None,
            salary_max: None,
            salary_currency: String::new(),
            is_remote: false,
            url: String::new(),
            employment_type: String::new(),
            experience_level: String::new(),
            posted_date,
            expires_date: None,
            requirements: Vec::new(),
            benefits: Vec::new(),
            fields: Map::new(),
        }
    }

    /// Builds the namespaced id used for every record of a source.
    pub fn source_id(source: &str, native_id: impl std::fmt::Display) -> String {
        format!("{source}-{native_id}")
    }
}

/// Identifier + display name of a connector.
///
/// The id is the registry key and the `connector_name` written to the sync
/// audit log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorIdentity {
    pub id: String,
    pub name: String,
}

impl ConnectorIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }
}
