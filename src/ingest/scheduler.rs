// src/ingest/scheduler.rs
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use cron::Schedule;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ingest::config::{
    parse_cron, ConfigError, SchedulerConfig, TopologyMode, DEFAULT_INTERVAL, MAX_INTERVAL_HOURS,
};
use crate::ingest::http_plugin::HttpPluginConnector;
use crate::ingest::registry::PluginRegistry;
use crate::ingest::types::Connector;

/// Exactly one firing mechanism is active per scheduler.
#[derive(Debug, Clone)]
pub enum Cadence {
    Cron { expr: String, schedule: Box<Schedule> },
    Interval(Duration),
}

impl Cadence {
    pub fn is_cron(&self) -> bool {
        matches!(self, Cadence::Cron { .. })
    }

    /// Next firing after `now`. `None` when a cron schedule has no future
    /// occurrence.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Cadence::Cron { schedule, .. } => schedule.after(&now).next(),
            Cadence::Interval(d) => chrono::Duration::from_std(*d).ok().map(|d| now + d),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Startup,
    Scheduled,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorFailure {
    pub connector: String,
    pub error: String,
}

/// Outcome of one pass over the active connectors. Failures are reported
/// here and in the logs, never as an error of the pass itself.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub succeeded: Vec<String>,
    pub failed: Vec<ConnectorFailure>,
}

impl CycleReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// One spawned loop and the stop signal only that loop listens to.
struct LoopHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    /// Still firing: not finished and no stop requested.
    fn is_live(&self) -> bool {
        !self.task.is_finished() && !*self.stop_tx.borrow()
    }
}

pub struct Scheduler {
    registry: Arc<PluginRegistry>,
    cadence: Cadence,
    topology: TopologyMode,
    plugin_timeout: Duration,
    // Serializes scheduled and manual cycles.
    cycle_lock: tokio::sync::Mutex<()>,
    current: Mutex<Option<LoopHandle>>,
}

impl Scheduler {
    /// Resolves the cadence once. A cron expression wins over the interval;
    /// an invalid one is a construction error.
    pub fn new(registry: Arc<PluginRegistry>, cfg: SchedulerConfig) -> Result<Self, ConfigError> {
        let cadence = match cfg.cron.as_deref() {
            Some(expr) => Cadence::Cron {
                expr: expr.to_string(),
                schedule: Box::new(parse_cron(expr)?),
            },
            None => Cadence::Interval(clamp_interval(cfg.interval)),
        };
        Ok(Self {
            registry,
            cadence,
            topology: cfg.topology,
            plugin_timeout: cfg.plugin_timeout,
            cycle_lock: tokio::sync::Mutex::new(()),
            current: Mutex::new(None),
        })
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    pub fn topology(&self) -> &TopologyMode {
        &self.topology
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .map(|c| c.as_ref().is_some_and(LoopHandle::is_live))
            .unwrap_or(false)
    }

    /// Spawns the background loop, which fires once right away and then on
    /// the cadence. Returns `false` (and does nothing) if already running.
    /// A loop that was told to stop but is still finishing its cycle does
    /// not count as running; it exits on its own.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.as_ref().is_some_and(LoopHandle::is_live) {
            tracing::debug!("scheduler already running");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        match &self.cadence {
            Cadence::Cron { expr, .. } => tracing::info!(cron = %expr, "starting scheduler"),
            Cadence::Interval(d) => {
                tracing::info!(interval_secs = d.as_secs(), "starting scheduler")
            }
        }
        let task = tokio::spawn(Arc::clone(self).run_loop(stop_rx));
        *current = Some(LoopHandle { stop_tx, task });
        true
    }

    /// Prevents future firings. A cycle already in progress runs to completion.
    pub fn stop(&self) {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(run) = current.as_ref() {
            run.stop_tx.send_replace(true);
        }
        tracing::info!("scheduler stop requested");
    }

    /// One immediate pass over every active connector, independent of the
    /// timer. Individual connector failures are in the report, not the error;
    /// an error means the pass could not be set up at all.
    pub async fn run_manual_sync(&self) -> anyhow::Result<CycleReport> {
        self.run_cycle(Trigger::Manual).await
    }

    /// Connectors for the configured topology, in run order.
    pub fn active_connectors(&self) -> anyhow::Result<Vec<Arc<dyn Connector>>> {
        match &self.topology {
            TopologyMode::Local => Ok(self.registry.enabled()),
            TopologyMode::Remote(endpoints) => endpoints
                .iter()
                .map(|ep| -> anyhow::Result<Arc<dyn Connector>> {
                    let c = HttpPluginConnector::new(
                        &ep.id,
                        &format!("{} HTTP Plugin", ep.name),
                        &ep.url,
                        self.plugin_timeout,
                    )
                    .with_context(|| format!("building HTTP plugin connector for {}", ep.id))?;
                    Ok(Arc::new(c) as Arc<dyn Connector>)
                })
                .collect(),
        }
    }

    async fn run_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        self.fire(Trigger::Startup).await;

        match self.cadence.clone() {
            Cadence::Interval(every) => {
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + every, every);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                while !*stop.borrow() {
                    tokio::select! {
                        _ = ticker.tick() => self.fire(Trigger::Scheduled).await,
                        _ = stop.changed() => {}
                    }
                }
            }
            Cadence::Cron { expr, schedule } => {
                while !*stop.borrow() {
                    let Some(next) = schedule.upcoming(Utc).next() else {
                        tracing::warn!(cron = %expr, "cron schedule has no future firing");
                        break;
                    };
                    let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tracing::debug!(next = %next, "next cron firing");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => self.fire(Trigger::Scheduled).await,
                        _ = stop.changed() => {}
                    }
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    async fn fire(&self, trigger: Trigger) {
        if let Err(e) = self.run_cycle(trigger).await {
            tracing::error!(trigger = trigger.as_str(), error = ?e, "sync cycle could not run");
        }
    }

    /// Runs every active connector sequentially; one failure never stops the
    /// rest of the pass.
    async fn run_cycle(&self, trigger: Trigger) -> anyhow::Result<CycleReport> {
        crate::ingest::ensure_metrics_described();
        let _guard = self.cycle_lock.lock().await;

        let started_at = Utc::now();
        let connectors = self.active_connectors()?;
        tracing::info!(
            trigger = trigger.as_str(),
            connectors = connectors.len(),
            remote = matches!(self.topology, TopologyMode::Remote(_)),
            "sync cycle started"
        );

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for connector in connectors {
            match connector.sync_jobs().await {
                Ok(()) => {
                    tracing::info!(connector = connector.id(), "sync completed");
                    succeeded.push(connector.id().to_string());
                }
                Err(e) => {
                    tracing::warn!(connector = connector.id(), error = %e, "sync failed");
                    failed.push(ConnectorFailure {
                        connector: connector.id().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let completed_at = Utc::now();
        counter!("scheduler_cycles_total", "trigger" => trigger.as_str()).increment(1);
        gauge!("scheduler_last_cycle_ts").set(completed_at.timestamp() as f64);
        tracing::info!(
            trigger = trigger.as_str(),
            succeeded = succeeded.len(),
            failed = failed.len(),
            "sync cycle finished"
        );

        Ok(CycleReport {
            trigger,
            started_at,
            completed_at,
            succeeded,
            failed,
        })
    }
}

/// Keeps the period inside what the tokio timer accepts: zero would panic
/// and a far-future deadline overflows `Instant`.
fn clamp_interval(every: Duration) -> Duration {
    let max = Duration::from_secs(MAX_INTERVAL_HOURS * 60 * 60);
    if every.is_zero() || every > max {
        tracing::warn!(interval_secs = every.as_secs(), "sync interval out of range, using default");
        DEFAULT_INTERVAL
    } else {
        every
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn registry() -> Arc<PluginRegistry> {
        Arc::new(PluginRegistry::new())
    }

    #[test]
    fn cron_takes_priority_over_interval() {
        let cfg = SchedulerConfig {
            cron: Some("0 6 * * *".into()),
            interval: Duration::from_secs(60),
            ..SchedulerConfig::default()
        };
        let s = Scheduler::new(registry(), cfg).unwrap();
        assert!(s.cadence().is_cron());
    }

    #[test]
    fn interval_is_used_without_cron() {
        let s = Scheduler::new(registry(), SchedulerConfig::default()).unwrap();
        match s.cadence() {
            Cadence::Interval(d) => assert_eq!(*d, Duration::from_secs(24 * 3600)),
            other => panic!("unexpected cadence {other:?}"),
        }
    }

    #[test]
    fn out_of_range_interval_uses_default() {
        for interval in [Duration::ZERO, Duration::MAX] {
            let cfg = SchedulerConfig {
                interval,
                ..SchedulerConfig::default()
            };
            let s = Scheduler::new(registry(), cfg).unwrap();
            assert!(matches!(s.cadence(), Cadence::Interval(d) if *d == DEFAULT_INTERVAL));
        }
    }

    #[test]
    fn invalid_cron_fails_construction() {
        let cfg = SchedulerConfig {
            cron: Some("every morning".into()),
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            Scheduler::new(registry(), cfg),
            Err(ConfigError::InvalidCron { .. })
        ));
    }

    #[test]
    fn next_after_follows_cadence() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 5, 30, 0).unwrap();
        let daily = Cadence::Cron {
            expr: "0 6 * * *".into(),
            schedule: Box::new(parse_cron("0 6 * * *").unwrap()),
        };
        assert_eq!(
            daily.next_after(now),
            Some(Utc.with_ymd_and_hms(2025, 9, 6, 6, 0, 0).unwrap())
        );
        let hourly = Cadence::Interval(Duration::from_secs(3600));
        assert_eq!(
            hourly.next_after(now),
            Some(Utc.with_ymd_and_hms(2025, 9, 6, 6, 30, 0).unwrap())
        );
    }

    #[test]
    fn remote_topology_builds_one_connector_per_endpoint() {
        let cfg = SchedulerConfig {
            topology: TopologyMode::Remote(crate::ingest::config::default_endpoints()),
            ..SchedulerConfig::default()
        };
        let s = Scheduler::new(registry(), cfg).unwrap();
        let ids: Vec<String> = s
            .active_connectors()
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids.len(), 6);
        assert!(ids.contains(&"indeed-chrome".to_string()));
    }
}
