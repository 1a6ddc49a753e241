//! Named connection registry.

use crate::connection::Connection;
use crate::error::{StoreError, StoreResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Maps resource names to live connections.
///
/// Every entity type names the resource its table lives in. Nodes resolve
/// that name here each time they need a connection, so an entity graph may
/// span several stores.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    connections: BTreeMap<String, Arc<dyn Connection>>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a connection under `name`.
    pub fn register(&mut self, name: impl Into<String>, connection: Arc<dyn Connection>) {
        let name = name.into();
        tracing::debug!(resource = %name, "registered connection");
        self.connections.insert(name, connection);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, connection: Arc<dyn Connection>) -> Self {
        self.register(name, connection);
        self
    }

    /// Returns the connection registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if nothing is registered under that name.
    pub fn resolve(&self, name: &str) -> StoreResult<Arc<dyn Connection>> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::resource_not_found(name))
    }

    /// Returns the registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.connections.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;

    #[test]
    fn resolve_registered() {
        let registry = ResourceRegistry::new()
            .with("main", Arc::new(MemoryConnection::new()))
            .with("audit", Arc::new(MemoryConnection::new()));

        assert!(registry.resolve("main").is_ok());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["audit", "main"]);
    }

    #[test]
    fn resolve_unknown() {
        let registry = ResourceRegistry::new();
        let err = registry.resolve("missing").err().unwrap();
        assert!(matches!(err, StoreError::ResourceNotFound { .. }));
        assert_eq!(err.code(), "08001");
    }

    #[test]
    fn shared_connection_sees_same_state() {
        let conn = Arc::new(MemoryConnection::new());
        let registry = ResourceRegistry::new().with("main", conn.clone());
        registry.resolve("main").unwrap().begin().unwrap();
        assert!(conn.in_transaction());
    }
}
