//! Session-scoped attribute definition cache.

use super::definition::AttributeDefinition;
use crate::error::CoreResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache key: tenant, definitions table and entity-type id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefinitionKey {
    /// Tenant id.
    pub tenant: String,
    /// Definitions table.
    pub table: String,
    /// Entity-type id.
    pub entity_type_id: i64,
}

/// Attribute definitions, loaded once per key.
///
/// Definitions are treated as static configuration, so nothing expires on
/// its own. Owned by a [`Session`](crate::Session); separate sessions never
/// share entries.
#[derive(Debug, Default)]
pub struct DefinitionCache {
    entries: Mutex<HashMap<DefinitionKey, Arc<Vec<AttributeDefinition>>>>,
}

impl DefinitionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached definitions for `key`, loading them on a miss.
    ///
    /// The lock is not held while `load` runs.
    ///
    /// # Errors
    ///
    /// Propagates errors from `load`; nothing is cached in that case.
    pub fn get_or_load<F>(&self, key: &DefinitionKey, load: F) -> CoreResult<Arc<Vec<AttributeDefinition>>>
    where
        F: FnOnce() -> CoreResult<Vec<AttributeDefinition>>,
    {
        if let Some(hit) = self.entries.lock().get(key) {
            return Ok(Arc::clone(hit));
        }
        let mut definitions = load()?;
        definitions.sort_by_key(|d| (d.sort_order, d.id));
        tracing::debug!(
            table = %key.table,
            entity_type_id = key.entity_type_id,
            count = definitions.len(),
            "loaded attribute definitions"
        );
        let loaded = Arc::new(definitions);
        self.entries
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drops the entry for `key`.
    pub fn invalidate(&self, key: &DefinitionKey) {
        self.entries.lock().remove(key);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
