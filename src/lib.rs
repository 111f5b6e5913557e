// src/lib.rs
// Public library surface shared by both binaries and the integration tests.

pub mod api;
pub mod audit;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::audit::{SyncAttempt, SyncCounts, SyncStatus};
pub use crate::ingest::registry::PluginRegistry;
pub use crate::ingest::run_sync_cycle;
pub use crate::ingest::scheduler::{CycleReport, Scheduler};
pub use crate::ingest::types::{Connector, ConnectorError};
pub use crate::models::{ConnectorIdentity, JobRecord};
pub use crate::store::{JobStore, MemoryJobStore, StoreError};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber: `RUST_LOG` filter (default
/// `openjobs_ingest=info,warn`), compact output or JSON with `LOG_FORMAT=json`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("openjobs_ingest=info,openjobs=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if let Err(e) = res {
        eprintln!("tracing already initialized: {e}");
    }
}
