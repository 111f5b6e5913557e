// src/ingest/types.rs
use thiserror::Error;

use crate::models::{ConnectorIdentity, JobRecord};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    Decode(String),

    /// Remote plugin answered with `success: false`.
    #[error("plugin reported failure: {0}")]
    Remote(String),

    /// Payload parsed but is not the expected shape (e.g. not a list of objects).
    #[error("unexpected payload shape: {0}")]
    Shape(String),

    #[error("connector misconfigured: {0}")]
    Config(String),

    #[error("all {attempted} pages failed, first error: {first}")]
    NoPagesSucceeded { attempted: usize, first: Box<ConnectorError> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        ConnectorError::Decode(e.to_string())
    }
}

/// A source of job postings.
///
/// `fetch_jobs` applies the source watermark and returns a batch with unique
/// ids. `sync_jobs` runs a full fetch → dedup → insert → audit cycle; local
/// connectors delegate to [`crate::ingest::run_sync_cycle`].
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Registry key and audit-log `connector_name`. Must be non-empty.
    fn id(&self) -> &str;

    /// Human readable name. Must be non-empty.
    fn name(&self) -> &str;

    fn identity(&self) -> ConnectorIdentity {
        ConnectorIdentity::new(self.id(), self.name())
    }

    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ConnectorError>;

    async fn sync_jobs(&self) -> Result<(), ConnectorError>;
}
