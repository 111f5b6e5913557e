// src/ingest/mod.rs
pub mod config;
pub mod extract;
pub mod http_plugin;
pub mod plugin_server;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod watermark;

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::audit::{SyncAttempt, SyncCounts};
use crate::ingest::types::{Connector, ConnectorError};
use crate::models::JobRecord;
use crate::store::{JobStore, StoreError};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_attempts_total", "Sync attempts by connector and status.");
        describe_counter!("sync_jobs_fetched_total", "Records returned by fetch_jobs.");
        describe_counter!("sync_jobs_inserted_total", "Records inserted into the store.");
        describe_counter!(
            "sync_jobs_duplicate_total",
            "Records skipped because the id was already stored."
        );
        describe_counter!(
            "sync_jobs_failed_total",
            "Records whose lookup or insert failed."
        );
        describe_counter!(
            "connector_page_errors_total",
            "Pages or sub-queries skipped after an error."
        );
        describe_counter!("plugin_http_errors_total", "Remote plugin call failures.");
        describe_counter!("scheduler_cycles_total", "Scheduler cycles by trigger.");
        describe_histogram!("sync_duration_ms", "Sync cycle duration in milliseconds.");
        describe_histogram!("connector_parse_ms", "Time to parse one source payload.");
        describe_gauge!(
            "scheduler_last_cycle_ts",
            "Unix ts when the scheduler last finished a cycle."
        );
        describe_gauge!(
            "scheduler_interval_secs",
            "Configured sync interval in seconds, 0 when cron-driven."
        );
    });
}

/// Clean free text from a source: decode entities, strip tags, normalize
/// quotes, collapse runs of spaces while keeping paragraph breaks.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Block-level tags become line breaks, the rest are dropped
    static RE_PARA: OnceCell<regex::Regex> = OnceCell::new();
    let re_para =
        RE_PARA.get_or_init(|| regex::Regex::new(r"(?i)<\s*/\s*(p|div|h[1-6])\s*>").unwrap());
    out = re_para.replace_all(&out, "\n\n").to_string();

    static RE_BREAKS: OnceCell<regex::Regex> = OnceCell::new();
    let re_breaks =
        RE_BREAKS.get_or_init(|| regex::Regex::new(r"(?i)<\s*(br|/li)\s*/?>").unwrap());
    out = re_breaks.replace_all(&out, "\n").to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse horizontal whitespace, then cap blank lines at one
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[ \t\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    static RE_NL: OnceCell<regex::Regex> = OnceCell::new();
    let re_nl = RE_NL.get_or_init(|| regex::Regex::new(r"\s*\n\s*\n\s*").unwrap());
    out = re_nl.replace_all(&out, "\n\n").to_string();

    out = out
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    // 5) Length cap: 20k chars
    if out.chars().count() > 20_000 {
        out = out.chars().take(20_000).collect();
    }

    out
}

/// Drops records whose id was already seen earlier in the batch, keeping the
/// first occurrence. Returns the survivors and the number removed.
pub fn dedup_by_id(records: Vec<JobRecord>) -> (Vec<JobRecord>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut keep = Vec::with_capacity(records.len());
    let mut removed = 0usize;
    for r in records {
        if seen.insert(r.id.clone()) {
            keep.push(r);
        } else {
            removed += 1;
        }
    }
    (keep, removed)
}

/// Runs one request per page or sub-query, sequentially, sleeping `pause`
/// between requests. Failed pages are logged and skipped; the call fails only
/// when every page failed.
pub async fn collect_pages<P, F, Fut>(
    connector: &str,
    pages: &[P],
    pause: Duration,
    mut fetch_page: F,
) -> Result<Vec<JobRecord>, ConnectorError>
where
    P: std::fmt::Debug,
    F: FnMut(&P) -> Fut,
    Fut: Future<Output = Result<Vec<JobRecord>, ConnectorError>>,
{
    let mut out = Vec::new();
    let mut first_error: Option<ConnectorError> = None;
    let mut succeeded = 0usize;

    for (i, page) in pages.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        match fetch_page(page).await {
            Ok(mut batch) => {
                tracing::debug!(connector, ?page, count = batch.len(), "page fetched");
                succeeded += 1;
                out.append(&mut batch);
            }
            Err(e) => {
                tracing::warn!(connector, ?page, error = %e, "page failed, skipping");
                counter!("connector_page_errors_total", "connector" => connector.to_string())
                    .increment(1);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(first) if succeeded == 0 => Err(ConnectorError::NoPagesSucceeded {
            attempted: pages.len(),
            first: Box::new(first),
        }),
        _ => Ok(out),
    }
}

/// One full sync cycle for a connector against `store`:
/// fetch → per record existence check → insert → exactly one audit entry.
///
/// A fetch failure is logged as an `error` attempt with zero counts and then
/// returned. Per-record store failures are counted and skipped.
pub async fn run_sync_cycle<C>(connector: &C, store: &dyn JobStore) -> Result<SyncAttempt, ConnectorError>
where
    C: Connector + ?Sized,
{
    ensure_metrics_described();
    let id = connector.id().to_string();
    let started_at = Utc::now();
    tracing::info!(connector = %id, "sync started");

    let records = match connector.fetch_jobs().await {
        Ok(v) => v,
        Err(e) => {
            let attempt = SyncAttempt::fetch_failed(&id, started_at, &e);
            record_attempt(store, &attempt).await;
            tracing::warn!(connector = %id, error = %e, "sync fetch failed");
            return Err(e);
        }
    };

    let mut counts = SyncCounts {
        fetched: records.len(),
        ..SyncCounts::default()
    };

    for job in &records {
        match store.get_job(&job.id).await {
            Ok(_) => {
                counts.duplicates += 1;
                continue;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(connector = %id, job_id = %job.id, error = %e, "existence check failed, skipping");
                counts.failed += 1;
                continue;
            }
        }

        match store.create_job(job).await {
            Ok(()) => {
                counts.inserted += 1;
                tracing::debug!(connector = %id, job_id = %job.id, title = %job.title, "stored job");
            }
            // Lost a race with another writer; the record is stored either way.
            Err(StoreError::AlreadyExists(_)) => counts.duplicates += 1,
            Err(e) => {
                tracing::warn!(connector = %id, job_id = %job.id, error = %e, "insert failed, skipping");
                counts.failed += 1;
            }
        }
    }

    let attempt = SyncAttempt::completed(&id, started_at, counts);
    record_attempt(store, &attempt).await;
    tracing::info!(
        connector = %id,
        fetched = counts.fetched,
        inserted = counts.inserted,
        duplicates = counts.duplicates,
        failed = counts.failed,
        status = attempt.status.as_str(),
        "sync complete"
    );
    Ok(attempt)
}

async fn record_attempt(store: &dyn JobStore, attempt: &SyncAttempt) {
    let connector = attempt.connector_name.clone();
    counter!(
        "sync_attempts_total",
        "connector" => connector.clone(),
        "status" => attempt.status.as_str()
    )
    .increment(1);
    counter!("sync_jobs_fetched_total", "connector" => connector.clone())
        .increment(attempt.jobs_fetched as u64);
    counter!("sync_jobs_inserted_total", "connector" => connector.clone())
        .increment(attempt.jobs_inserted as u64);
    counter!("sync_jobs_duplicate_total", "connector" => connector.clone())
        .increment(attempt.jobs_duplicates as u64);
    counter!("sync_jobs_failed_total", "connector" => connector.clone())
        .increment(attempt.jobs_failed as u64);
    histogram!("sync_duration_ms", "connector" => connector.clone())
        .record(attempt.duration_ms() as f64);

    if let Err(e) = store.log_sync(attempt).await {
        tracing::warn!(connector = %connector, error = %e, "failed to write sync audit entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(id: &str) -> JobRecord {
        JobRecord::new(id, Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn normalize_text_strips_tags_and_keeps_paragraphs() {
        let s = "<p>Hello&nbsp;&nbsp; <b>world</b></p><p>  Second   para </p>";
        assert_eq!(normalize_text(s), "Hello world\n\nSecond para");
    }

    #[test]
    fn normalize_text_folds_quotes() {
        assert_eq!(normalize_text("&ldquo;ok&rdquo; it\u{2019}s"), "\"ok\" it's");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut a = rec("jooble-1");
        a.title = "first".into();
        let mut b = rec("jooble-1");
        b.title = "second".into();
        let (kept, removed) = dedup_by_id(vec![a, rec("jooble-2"), b]);
        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "first");
    }

    #[tokio::test]
    async fn collect_pages_skips_failed_pages() {
        let pages = ["a", "bad", "c"];
        let out = collect_pages("t", &pages, Duration::ZERO, |p| {
            let p = p.to_string();
            async move {
                if p == "bad" {
                    Err(ConnectorError::Status {
                        status: 500,
                        body: "oops".into(),
                    })
                } else {
                    Ok(vec![rec(&format!("t-{p}"))])
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn collect_pages_fails_when_nothing_succeeds() {
        let pages = [1, 2];
        let err = collect_pages("t", &pages, Duration::ZERO, |_| async {
            Err(ConnectorError::Decode("bad json".into()))
        })
        .await
        .unwrap_err();
        match err {
            ConnectorError::NoPagesSucceeded { attempted, first } => {
                assert_eq!(attempted, 2);
                assert!(first.to_string().contains("bad json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
