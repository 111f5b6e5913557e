// tests/registry.rs
//
// Covered:
// - register / get / unregister
// - re-registering an id replaces the entry
// - all() is a snapshot
// - empty ids, blank names and padded ids are refused
mod common;

use std::sync::Arc;

use common::ScriptedConnector;
use openjobs_ingest::{Connector, JobStore, MemoryJobStore, PluginRegistry};

fn store() -> Arc<dyn JobStore> {
    Arc::new(MemoryJobStore::new())
}

fn connector(id: &str) -> Arc<dyn Connector> {
    Arc::new(ScriptedConnector::new(id, Vec::new(), store()))
}

#[test]
fn register_get_unregister() {
    let reg = PluginRegistry::new();
    assert!(reg.is_empty());
    assert!(reg.enabled().is_empty());

    assert!(reg.register(connector("remotive")).is_none());
    assert!(reg.register(connector("arbetsformedlingen")).is_none());
    assert_eq!(reg.len(), 2);
    assert_eq!(reg.get("remotive").map(|c| c.id().to_string()), Some("remotive".into()));
    assert!(reg.get("jooble").is_none());

    assert!(reg.unregister("remotive").is_some());
    assert!(reg.unregister("remotive").is_none(), "second unregister is a no-op");
    assert_eq!(reg.ids(), vec!["arbetsformedlingen".to_string()]);
}

#[test]
fn same_id_replaces_previous_connector() {
    let reg = PluginRegistry::new();
    let first = connector("remoteok");
    let second = connector("remoteok");

    reg.register(first.clone());
    let previous = reg.register(second.clone()).expect("previous entry returned");

    assert!(Arc::ptr_eq(&previous, &first));
    assert!(Arc::ptr_eq(&reg.get("remoteok").unwrap(), &second));
    assert_eq!(reg.len(), 1);
}

#[test]
fn all_is_a_snapshot_and_enabled_is_ordered() {
    let reg = PluginRegistry::new();
    reg.register(connector("remotive"));
    reg.register(connector("arbetsformedlingen"));

    let snapshot = reg.all();
    reg.register(connector("jooble"));

    assert_eq!(snapshot.len(), 2);
    assert_eq!(reg.len(), 3);

    let ids: Vec<String> = reg.enabled().iter().map(|c| c.id().to_string()).collect();
    assert_eq!(ids, vec!["arbetsformedlingen", "jooble", "remotive"]);
}

#[test]
fn reregistering_keeps_two_entries_and_newest_instance() {
    let reg = PluginRegistry::new();
    let a1 = connector("a");
    let a2 = connector("a");
    reg.register(a1);
    reg.register(connector("b"));
    reg.register(a2.clone());

    assert_eq!(reg.all().len(), 2);
    assert!(Arc::ptr_eq(&reg.get("a").unwrap(), &a2));
    for c in reg.enabled() {
        assert!(c.identity().is_valid());
    }
}

#[test]
fn empty_id_is_refused() {
    let reg = PluginRegistry::new();
    assert!(reg.register(connector("  ")).is_none());
    assert!(reg.is_empty());
}

#[test]
fn padded_id_is_refused() {
    let reg = PluginRegistry::new();
    reg.register(connector(" remotive "));
    assert!(reg.is_empty());
    assert!(reg.get("remotive").is_none());
}

#[test]
fn blank_name_is_refused() {
    struct Nameless(ScriptedConnector);

    #[async_trait::async_trait]
    impl Connector for Nameless {
        fn id(&self) -> &str {
            self.0.id()
        }
        fn name(&self) -> &str {
            " "
        }
        async fn fetch_jobs(
            &self,
        ) -> Result<Vec<openjobs_ingest::JobRecord>, openjobs_ingest::ConnectorError> {
            self.0.fetch_jobs().await
        }
        async fn sync_jobs(&self) -> Result<(), openjobs_ingest::ConnectorError> {
            self.0.sync_jobs().await
        }
    }

    let reg = PluginRegistry::new();
    reg.register(Arc::new(Nameless(ScriptedConnector::new("x", Vec::new(), store()))));
    assert!(reg.is_empty());
}
