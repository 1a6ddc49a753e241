//! Session: the context every node is created in.

use crate::attribute::{AttributeSetDef, AttributeStore, DefinitionCache};
use crate::catalog::Catalog;
use crate::collection::CollectionNode;
use crate::config::Config;
use crate::entity::{EntityNode, EntityType};
use crate::error::CoreResult;
use cascade_store::{Connection, Filter, ResourceRegistry, TableSchema};
use cascade_value::{TextEncoding, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct SessionInner {
    registry: ResourceRegistry,
    catalog: Catalog,
    config: Config,
    encoding: TextEncoding,
    definitions: DefinitionCache,
    schemas: Mutex<HashMap<(String, String), TableSchema>>,
    actor: Option<String>,
}

/// Connections, types, configuration and caches shared by an entity graph.
///
/// Cloning a session is cheap; clones share caches.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cascade_core::{Catalog, EntityType, Session};
/// use cascade_store::{ColumnSchema, MemoryConnection, ResourceRegistry, TableSchema};
/// use cascade_value::{DataType, Value};
///
/// let conn = Arc::new(MemoryConnection::new());
/// conn.create_table(
///     TableSchema::new("notes")
///         .column(ColumnSchema::id("id"))
///         .column(ColumnSchema::new("body", DataType::Text)),
/// );
/// let session = Session::builder(
///     ResourceRegistry::new().with("default", conn),
///     Catalog::new().with_entity(EntityType::new("Note", "notes")),
/// )
/// .build();
///
/// let mut note = session.new_entity("Note").unwrap();
/// note.set("body", "hello").unwrap();
/// assert!(note.save_all().unwrap());
/// let stored = session.find("Note", 1i64).unwrap().unwrap();
/// assert_eq!(stored.get("body").unwrap(), Value::from("hello"));
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

/// Builder for [`Session`].
#[derive(Debug)]
pub struct SessionBuilder {
    registry: ResourceRegistry,
    catalog: Catalog,
    config: Config,
    actor: Option<String>,
}

impl SessionBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the acting user recorded in audit attributes.
    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Builds the session.
    #[must_use]
    pub fn build(self) -> Session {
        let encoding = TextEncoding::new(self.config.null_token.clone());
        Session {
            inner: Arc::new(SessionInner {
                registry: self.registry,
                catalog: self.catalog,
                config: self.config,
                encoding,
                definitions: DefinitionCache::new(),
                schemas: Mutex::new(HashMap::new()),
                actor: self.actor,
            }),
        }
    }
}

impl Session {
    /// Starts building a session.
    #[must_use]
    pub fn builder(registry: ResourceRegistry, catalog: Catalog) -> SessionBuilder {
        SessionBuilder {
            registry,
            catalog,
            config: Config::default(),
            actor: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Returns the attribute value encoding.
    #[must_use]
    pub fn encoding(&self) -> &TextEncoding {
        &self.inner.encoding
    }

    /// Returns the attribute definition cache.
    #[must_use]
    pub fn definitions(&self) -> &DefinitionCache {
        &self.inner.definitions
    }

    /// Returns the acting user.
    #[must_use]
    pub fn actor(&self) -> Option<&str> {
        self.inner.actor.as_deref()
    }

    /// Resolves a resource name to its connection.
    ///
    /// # Errors
    ///
    /// Returns a store error if nothing is registered under `resource`.
    pub fn connection(&self, resource: &str) -> CoreResult<Arc<dyn Connection>> {
        Ok(self.inner.registry.resolve(resource)?)
    }

    /// Returns the schema of `table`, asking the store only once.
    ///
    /// # Errors
    ///
    /// Returns a store error if the resource or table is unknown.
    pub fn table_schema(&self, resource: &str, table: &str) -> CoreResult<TableSchema> {
        let key = (resource.to_string(), table.to_string());
        if let Some(schema) = self.inner.schemas.lock().get(&key) {
            return Ok(schema.clone());
        }
        let schema = self.connection(resource)?.table_schema(table)?;
        self.inner.schemas.lock().insert(key, schema.clone());
        Ok(schema)
    }

    /// Looks up an entity type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the catalog has no such type.
    pub fn entity_type(&self, name: &str) -> CoreResult<Arc<EntityType>> {
        self.inner.catalog.entity(name)
    }

    /// Looks up an attribute set.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the catalog has no such set.
    pub fn attribute_set(&self, name: &str) -> CoreResult<Arc<AttributeSetDef>> {
        self.inner.catalog.attribute_set(name)
    }

    /// Creates a new, unsaved entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the type or its table is unknown.
    pub fn new_entity(&self, type_name: &str) -> CoreResult<EntityNode> {
        EntityNode::new(self, type_name)
    }

    /// Creates an empty collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the member type is unknown.
    pub fn new_collection(&self, type_name: &str) -> CoreResult<CollectionNode> {
        CollectionNode::new(self, type_name)
    }

    /// Loads one entity by primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is unknown or the store query fails.
    pub fn find(&self, type_name: &str, key: impl Into<Value>) -> CoreResult<Option<EntityNode>> {
        let entity_type = self.entity_type(type_name)?;
        let filter = Filter::all().eq(entity_type.primary_key(), key);
        Ok(self.find_all(type_name, &filter)?.into_iter().next())
    }

    /// Loads every entity matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is unknown or the store query fails.
    pub fn find_all(&self, type_name: &str, filter: &Filter) -> CoreResult<Vec<EntityNode>> {
        let entity_type = self.entity_type(type_name)?;
        let connection = self.connection(entity_type.resource_name())?;
        let rows = connection.select(entity_type.table(), filter)?;
        rows.into_iter()
            .map(|row| EntityNode::from_row(self, Arc::clone(&entity_type), row))
            .collect()
    }

    /// Opens the attribute store of an object.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the set is unknown.
    pub fn attributes(&self, set: &str, object_id: Option<Value>) -> CoreResult<AttributeStore> {
        AttributeStore::new(self, set, object_id)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("registry", &self.inner.registry)
            .field("tenant", &self.inner.config.tenant)
            .field("actor", &self.inner.actor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_store::{ColumnSchema, MemoryConnection};
    use cascade_value::DataType;

    fn session() -> (Session, Arc<MemoryConnection>) {
        let conn = Arc::new(MemoryConnection::new());
        conn.create_table(
            TableSchema::new("notes")
                .column(ColumnSchema::id("id"))
                .column(ColumnSchema::new("body", DataType::Text)),
        );
        let session = Session::builder(
            ResourceRegistry::new().with("default", conn.clone()),
            Catalog::new().with_entity(EntityType::new("Note", "notes")),
        )
        .actor("alice")
        .build();
        (session, conn)
    }

    #[test]
    fn schema_is_cached() {
        let (session, _) = session();
        let first = session.table_schema("default", "notes").unwrap();
        let second = session.table_schema("default", "notes").unwrap();
        assert_eq!(first, second);
        assert!(session.table_schema("default", "missing").is_err());
    }

    #[test]
    fn unknown_resource() {
        let (session, _) = session();
        assert!(session.connection("archive").is_err());
    }

    #[test]
    fn find_materializes_clean_nodes() {
        let (session, conn) = session();
        let mut row = cascade_store::Row::new();
        row.insert("body".into(), Value::from("hi"));
        conn.insert("notes", &row).unwrap();

        let note = session.find("Note", 1i64).unwrap().unwrap();
        assert!(!note.is_new());
        assert!(!note.has_changes());
        assert!(session.find("Note", 2i64).unwrap().is_none());
        assert_eq!(session.actor(), Some("alice"));
    }
}
