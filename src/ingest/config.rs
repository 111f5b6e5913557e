// src/ingest/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use cron::Schedule;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::http_plugin::DEFAULT_PLUGIN_TIMEOUT;

const ENV_PATH: &str = "PLUGINS_CONFIG_PATH";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Longest accepted sync interval, one year.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365;

/// Default plugin services (docker-compose layout).
const DEFAULT_PLUGINS: &[(&str, &str, &str)] = &[
    ("arbetsformedlingen", "Arbetsförmedlingen", "http://localhost:8081"),
    ("eures", "EURES", "http://localhost:8082"),
    ("remotive", "Remotive", "http://localhost:8083"),
    ("remoteok", "RemoteOK", "http://localhost:8084"),
    ("indeed-chrome", "Indeed Chrome", "http://localhost:8087"),
    ("jooble", "Jooble", "http://localhost:8088"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("reading plugin config {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing plugin config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEndpoint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
}

impl PluginEndpoint {
    pub fn new(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Where a cycle's connectors come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyMode {
    /// Iterate the in-process registry.
    Local,
    /// One HTTP plugin connector per endpoint.
    Remote(Vec<PluginEndpoint>),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Takes priority over `interval` when set.
    pub cron: Option<String>,
    pub interval: Duration,
    pub topology: TopologyMode,
    pub plugin_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: None,
            interval: DEFAULT_INTERVAL,
            topology: TopologyMode::Local,
            plugin_timeout: DEFAULT_PLUGIN_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    /// Reads `CRON_SCHEDULE`, `SYNC_INTERVAL_HOURS`, `PLUGIN_TIMEOUT_SECS` and
    /// `USE_HTTP_PLUGINS`. Malformed numbers fall back to defaults; the cron
    /// expression itself is validated by the scheduler.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        cfg.cron = std::env::var("CRON_SCHEDULE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if let Some(hours) = env_u64("SYNC_INTERVAL_HOURS") {
            match hours.checked_mul(60 * 60).filter(|_| hours <= MAX_INTERVAL_HOURS) {
                Some(secs) => cfg.interval = Duration::from_secs(secs),
                None => tracing::warn!(
                    key = "SYNC_INTERVAL_HOURS",
                    value = hours,
                    max = MAX_INTERVAL_HOURS,
                    "ignoring invalid value, using default"
                ),
            }
        }
        if let Some(secs) = env_u64("PLUGIN_TIMEOUT_SECS") {
            cfg.plugin_timeout = Duration::from_secs(secs);
        }

        if env_flag("USE_HTTP_PLUGINS") {
            cfg.topology = TopologyMode::Remote(load_plugin_endpoints()?);
        }
        Ok(cfg)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid value, using default");
            None
        }
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// `PLUGIN_<ID>_URL`, with the id upper-cased and `-` mapped to `_`.
pub fn url_env_key(id: &str) -> String {
    format!("PLUGIN_{}_URL", id.to_ascii_uppercase().replace('-', "_"))
}

pub fn default_endpoints() -> Vec<PluginEndpoint> {
    DEFAULT_PLUGINS
        .iter()
        .map(|(id, name, url)| PluginEndpoint::new(id, name, url))
        .collect()
}

pub fn default_plugin_url(id: &str) -> Option<&'static str> {
    DEFAULT_PLUGINS
        .iter()
        .find(|(pid, _, _)| *pid == id)
        .map(|(_, _, url)| *url)
}

/// Resolve the remote plugin set:
/// 1) $PLUGINS_CONFIG_PATH
/// 2) config/plugins.toml
/// 3) config/plugins.json
/// 4) built-in defaults
///
/// then apply `PLUGIN_<ID>_URL` overrides and the `ENABLED_PLUGINS` filter.
pub fn load_plugin_endpoints() -> Result<Vec<PluginEndpoint>, ConfigError> {
    let mut endpoints = load_endpoint_table()?;

    for ep in endpoints.iter_mut() {
        if let Ok(url) = std::env::var(url_env_key(&ep.id)) {
            if !url.trim().is_empty() {
                ep.url = url.trim().to_string();
            }
        }
        if ep.name.trim().is_empty() {
            ep.name = ep.id.clone();
        }
    }

    if let Ok(list) = std::env::var("ENABLED_PLUGINS") {
        let wanted: Vec<String> = list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !wanted.is_empty() {
            endpoints.retain(|ep| wanted.contains(&ep.id));
        }
    }

    endpoints.retain(|ep| !ep.id.trim().is_empty() && !ep.url.trim().is_empty());
    Ok(endpoints)
}

fn load_endpoint_table() -> Result<Vec<PluginEndpoint>, ConfigError> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        return load_endpoints_from(Path::new(&p));
    }
    for candidate in ["config/plugins.toml", "config/plugins.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_endpoints_from(&pb);
        }
    }
    Ok(default_endpoints())
}

/// Load an endpoint table from an explicit path. Supports TOML or JSON.
pub fn load_endpoints_from(path: &Path) -> Result<Vec<PluginEndpoint>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::File {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_endpoints(&content, ext.as_str()).map_err(|reason| ConfigError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

#[derive(Deserialize)]
struct EndpointTable {
    plugins: Vec<PluginEndpoint>,
}

fn parse_endpoints(s: &str, hint_ext: &str) -> Result<Vec<PluginEndpoint>, String> {
    if hint_ext == "toml" {
        return toml::from_str::<EndpointTable>(s)
            .map(|t| t.plugins)
            .map_err(|e| e.to_string());
    }
    // JSON: either {"plugins": [...]} or a bare array
    if let Ok(t) = serde_json::from_str::<EndpointTable>(s) {
        return Ok(t.plugins);
    }
    match serde_json::from_str::<Vec<PluginEndpoint>>(s) {
        Ok(v) => Ok(v),
        Err(json_err) => toml::from_str::<EndpointTable>(s)
            .map(|t| t.plugins)
            .map_err(|_| format!("neither JSON nor TOML: {json_err}")),
    }
}

/// Parse a cron expression, prepending a seconds field to 5-field input.
pub fn parse_cron(expr: &str) -> Result<Schedule, ConfigError> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| ConfigError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}
