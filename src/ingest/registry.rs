// src/ingest/registry.rs
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ingest::types::Connector;

/// Connectors keyed by id.
///
/// Registering an id that is already present replaces the previous connector.
/// Iteration order is by id, so cycles run in a stable order.
#[derive(Default)]
pub struct PluginRegistry {
    connectors: RwLock<BTreeMap<String, Arc<dyn Connector>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-written.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn Connector>>> {
        self.connectors.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn Connector>>> {
        self.connectors.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the connector previously registered under the same id.
    /// Connectors without an id or name, or whose id carries surrounding
    /// whitespace, are rejected.
    pub fn register(&self, connector: Arc<dyn Connector>) -> Option<Arc<dyn Connector>> {
        let identity = connector.identity();
        if !identity.is_valid() || identity.id.trim() != identity.id {
            tracing::warn!(
                id = ?identity.id,
                name = ?identity.name,
                "refusing to register connector with invalid identity"
            );
            return None;
        }
        let id = identity.id;
        let previous = self.write().insert(id.clone(), connector);
        if previous.is_some() {
            tracing::info!(connector = %id, "connector replaced");
        } else {
            tracing::info!(connector = %id, "connector registered");
        }
        previous
    }

    /// Unknown ids are a no-op.
    pub fn unregister(&self, id: &str) -> Option<Arc<dyn Connector>> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            tracing::info!(connector = id, "connector unregistered");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.read().get(id).cloned()
    }

    /// Snapshot; later registrations do not affect it.
    pub fn all(&self) -> BTreeMap<String, Arc<dyn Connector>> {
        self.read().clone()
    }

    /// Every registered connector is currently enabled.
    pub fn enabled(&self) -> Vec<Arc<dyn Connector>> {
        self.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("connectors", &self.ids())
            .finish()
    }
}
