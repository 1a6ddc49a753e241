//! Attribute store: the values of one attribute set for one object.

use super::cache::DefinitionKey;
use super::definition::{definition_columns, value_columns, AttributeDefinition, AttributeSetDef};
use crate::error::{CoreError, CoreResult};
use crate::node::{NodeSnapshot, Persistable, SaveOptions};
use crate::orchestrator;
use crate::policy::{ActionError, ActionErrorSink, MutabilityPolicy};
use crate::session::Session;
use crate::tracker::{ChangeTracker, TrackerSnapshot};
use cascade_store::{Connection, Filter, Row};
use cascade_value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Timestamp layout written to audit attributes.
const AUDIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Load state of an [`AttributeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing read yet.
    #[default]
    Unloaded,
    /// Values of a known object have been read.
    Loaded,
    /// No object id yet; every attribute holds its default.
    NewPrepared,
}

/// Captured state of an attribute store.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSnapshot {
    /// Values and dirty map.
    pub tracker: TrackerSnapshot,
    /// Object id.
    pub object_id: Option<Value>,
    /// Object id waiting for the next successful save.
    pub pending_object_id: Option<Value>,
    /// Load state.
    pub state: LoadState,
    /// Attributes not read yet.
    pub lazy: BTreeSet<String>,
    /// Stored row id per attribute name.
    pub rows: BTreeMap<String, Value>,
}

/// Entity-attribute-value storage for one object.
///
/// Reads and writes load what they need on their own: the first access
/// reads every non-lazy attribute, and the first access of a lazy
/// attribute reads that attribute.
///
/// # Example
///
/// ```ignore
/// let mut store = session.attributes("ticket_attributes", Some(Value::Integer(7)))?;
/// store.set("priority", 2i64)?;
/// store.save_all()?;
/// ```
#[derive(Debug, Clone)]
pub struct AttributeStore {
    session: Session,
    set: Arc<AttributeSetDef>,
    object_id: Option<Value>,
    pending_object_id: Option<Value>,
    state: LoadState,
    definitions: Arc<Vec<AttributeDefinition>>,
    tracker: ChangeTracker,
    lazy: BTreeSet<String>,
    rows: BTreeMap<String, Value>,
    policy: MutabilityPolicy,
    sink: ActionErrorSink,
    own_snapshot: Option<AttributeSnapshot>,
}

impl AttributeStore {
    /// Opens the store of `object_id` in the set named `set_name`.
    ///
    /// Nothing is read until the first access.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the set is not registered.
    pub fn new(session: &Session, set_name: &str, object_id: Option<Value>) -> CoreResult<Self> {
        let set = session.attribute_set(set_name)?;
        let policy = set.policy();
        Ok(Self {
            session: session.clone(),
            set,
            object_id: object_id.filter(|id| !id.is_null()),
            pending_object_id: None,
            state: LoadState::Unloaded,
            definitions: Arc::new(Vec::new()),
            tracker: ChangeTracker::loaded(BTreeMap::new()),
            lazy: BTreeSet::new(),
            rows: BTreeMap::new(),
            policy,
            sink: ActionErrorSink::default(),
            own_snapshot: None,
        })
    }

    /// Returns the set definition.
    #[must_use]
    pub fn set_definition(&self) -> &AttributeSetDef {
        &self.set
    }

    /// Returns the object id, if known.
    #[must_use]
    pub fn object_id(&self) -> Option<&Value> {
        self.object_id.as_ref()
    }

    /// Returns the object id that will replace the current one on the
    /// next successful save.
    #[must_use]
    pub fn pending_object_id(&self) -> Option<&Value> {
        self.pending_object_id.as_ref()
    }

    /// Assigns the object id.
    ///
    /// A store already loaded for another object keeps its id until the
    /// next successful save, which moves the stored rows in one update.
    pub fn assign_object_id(&mut self, object_id: Value) {
        if object_id.is_null() {
            return;
        }
        match &self.object_id {
            Some(current) if *current == object_id => {
                self.pending_object_id = None;
            }
            Some(current) if self.state == LoadState::Loaded => {
                tracing::debug!(
                    set = self.set.name(),
                    from = %current,
                    to = %object_id,
                    "object id change deferred to next save"
                );
                self.pending_object_id = Some(object_id);
            }
            _ => {
                self.object_id = Some(object_id);
                self.pending_object_id = None;
            }
        }
    }

    /// Returns the load state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Returns true once values are in place.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state != LoadState::Unloaded
    }

    /// Returns the definitions read by the last load.
    #[must_use]
    pub fn definitions(&self) -> &[AttributeDefinition] {
        &self.definitions
    }

    /// Returns the names of attributes not read yet.
    #[must_use]
    pub fn lazy_attributes(&self) -> &BTreeSet<String> {
        &self.lazy
    }

    /// Returns the value tracker.
    #[must_use]
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    fn fetch_definitions(&self) -> CoreResult<Arc<Vec<AttributeDefinition>>> {
        let entity_type_id = self.set.require_entity_type_id()?;
        let key = DefinitionKey {
            tenant: self.session.config().tenant.clone(),
            table: self.set.definitions().to_string(),
            entity_type_id,
        };
        let session = &self.session;
        let set = &self.set;
        session.definitions().get_or_load(&key, || {
            let connection = session.connection(set.resource_name())?;
            let filter = Filter::all().eq(definition_columns::ENTITY_TYPE_ID, entity_type_id);
            connection
                .select(set.definitions(), &filter)?
                .iter()
                .map(|row| AttributeDefinition::from_row(row, set.definitions(), session.encoding()))
                .collect()
        })
    }

    fn object_filter(&self, object_id: &Value) -> CoreResult<Filter> {
        Ok(Filter::all()
            .eq(value_columns::ENTITY_TYPE_ID, self.set.require_entity_type_id()?)
            .eq(value_columns::OBJECT_ID, object_id.clone()))
    }

    /// Reads the values of every attribute.
    ///
    /// Pending changes are discarded. Lazy attributes are skipped unless
    /// `force_lazy` is set. Without an object id every attribute holds its
    /// default and the store becomes [`LoadState::NewPrepared`].
    ///
    /// # Errors
    ///
    /// Returns `MissingEntityTypeId` if the set has no entity-type id, and
    /// store errors from reading definitions or values.
    pub fn load_attribute_values(&mut self, force_lazy: bool) -> CoreResult<()> {
        let definitions = self.fetch_definitions()?;
        self.state = LoadState::Unloaded;
        self.tracker = ChangeTracker::loaded(BTreeMap::new());
        self.lazy.clear();
        self.rows.clear();
        for definition in definitions.iter() {
            self.tracker
                .load_value(definition.name.clone(), definition.default.clone());
        }
        self.definitions = Arc::clone(&definitions);

        let Some(object_id) = self.object_id.clone() else {
            self.state = LoadState::NewPrepared;
            return Ok(());
        };

        let mut eager = Vec::new();
        for definition in definitions.iter() {
            if definition.lazy && !force_lazy {
                self.lazy.insert(definition.name.clone());
            } else {
                eager.push(Value::Integer(definition.id));
            }
        }
        if !eager.is_empty() {
            let mut filter = self.object_filter(&object_id)?;
            if !self.lazy.is_empty() {
                filter = filter.is_in(value_columns::ATTRIBUTE_ID, eager);
            }
            let connection = self.session.connection(self.set.resource_name())?;
            for row in connection.select(self.set.values(), &filter)? {
                self.apply_row(&row)?;
            }
        }
        self.state = LoadState::Loaded;
        tracing::debug!(
            set = self.set.name(),
            object_id = %object_id,
            deferred = self.lazy.len(),
            "loaded attribute values"
        );
        Ok(())
    }

    /// Reads lazy attributes: the named ones, or all when `names` is `None`.
    ///
    /// Attributes without a stored row keep their default. Names that are
    /// not lazy (anymore) are ignored.
    ///
    /// # Errors
    ///
    /// Returns store errors from the query.
    pub fn load_lazy_attribute(&mut self, names: Option<&[&str]>) -> CoreResult<()> {
        let wanted: Vec<String> = match names {
            Some(names) => names
                .iter()
                .filter(|name| self.lazy.contains(**name))
                .map(|name| (*name).to_string())
                .collect(),
            None => self.lazy.iter().cloned().collect(),
        };
        if wanted.is_empty() {
            return Ok(());
        }
        if let Some(object_id) = self.object_id.clone() {
            let ids: Vec<Value> = self
                .definitions
                .iter()
                .filter(|d| wanted.contains(&d.name))
                .map(|d| Value::Integer(d.id))
                .collect();
            let filter = self
                .object_filter(&object_id)?
                .is_in(value_columns::ATTRIBUTE_ID, ids);
            let connection = self.session.connection(self.set.resource_name())?;
            for row in connection.select(self.set.values(), &filter)? {
                self.apply_row(&row)?;
            }
        }
        for name in &wanted {
            self.lazy.remove(name);
        }
        Ok(())
    }

    fn apply_row(&mut self, row: &Row) -> CoreResult<()> {
        let attribute_id = row
            .get(value_columns::ATTRIBUTE_ID)
            .and_then(Value::as_integer)
            .ok_or_else(|| CoreError::invalid_row(self.set.values(), "attribute id is not an integer"))?;
        let Some(definition) = self.definitions.iter().find(|d| d.id == attribute_id) else {
            tracing::debug!(set = self.set.name(), attribute_id, "value row without definition ignored");
            return Ok(());
        };
        let value = match row.get(value_columns::VALUE) {
            Some(Value::Text(raw)) => self.session.encoding().decode(raw, definition.data_type)?,
            _ => Value::Null,
        };
        let name = definition.name.clone();
        if let Some(id) = row.get(value_columns::ID) {
            self.rows.insert(name.clone(), id.clone());
        }
        self.tracker.load_value(name, value);
        Ok(())
    }

    fn ensure_loaded(&mut self) -> CoreResult<()> {
        if self.state == LoadState::Unloaded {
            self.load_attribute_values(false)?;
        }
        Ok(())
    }

    fn definition(&self, name: &str) -> CoreResult<&AttributeDefinition> {
        self.definitions
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CoreError::unknown_field(self.set.name(), name))
    }

    /// Returns the value of attribute `name`, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` for names outside the set, and load errors.
    pub fn get(&mut self, name: &str) -> CoreResult<Value> {
        self.ensure_loaded()?;
        self.definition(name)?;
        self.load_lazy_attribute(Some(&[name]))?;
        Ok(self.tracker.value(name))
    }

    /// Sets attribute `name`, coerced to its declared type. Returns true if
    /// the value changed.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` for read-only stores, `UnknownField` for names
    /// outside the set, a value error if coercion fails, and load errors.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<bool> {
        if self.is_read_only() {
            return Err(CoreError::read_only(self.set.name()));
        }
        self.ensure_loaded()?;
        let data_type = self.definition(name)?.data_type;
        self.load_lazy_attribute(Some(&[name]))?;
        let value = data_type.coerce(value.into())?;
        Ok(self.tracker.record_change(name, value))
    }

    /// Returns every attribute value, reading lazy attributes too.
    ///
    /// # Errors
    ///
    /// Returns load errors.
    pub fn values(&mut self) -> CoreResult<BTreeMap<String, Value>> {
        self.ensure_loaded()?;
        self.load_lazy_attribute(None)?;
        Ok(self.tracker.values().clone())
    }

    /// Returns true if values or the object id changed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.tracker.is_dirty() || self.pending_object_id.is_some()
    }

    /// Returns the explicit policy flags.
    #[must_use]
    pub fn policy(&self) -> MutabilityPolicy {
        self.policy
    }

    /// Sets or clears the read-only flag.
    pub fn set_read_only(&mut self, value: Option<bool>) {
        self.policy.set_read_only(value);
    }

    /// Returns true if the store may not change.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.policy.is_read_only(self.session.config())
    }

    /// Returns true if the stored values may be deleted.
    #[must_use]
    pub fn can_delete(&self) -> bool {
        self.policy.can_delete(self.session.config())
    }

    pub(crate) fn attach(&mut self, policy: MutabilityPolicy) {
        self.policy = self.policy.overlay(policy);
    }

    /// Returns the errors of the last operation.
    #[must_use]
    pub fn errors(&self) -> &[ActionError] {
        self.sink.errors()
    }

    /// Returns the warnings of the last operation.
    #[must_use]
    pub fn warnings(&self) -> &[ActionError] {
        self.sink.warnings()
    }

    /// Writes the changed values in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` for read-only stores, `MissingObjectId` if there
    /// is no object to store values for, and configuration errors.
    pub fn save_all(&mut self) -> CoreResult<bool> {
        orchestrator::save_all(self, SaveOptions::default())
    }

    /// Deletes every stored value of the object in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` or `DeleteForbidden` if deletion is not allowed,
    /// and configuration errors.
    pub fn delete_full(&mut self) -> CoreResult<bool> {
        orchestrator::delete_full(self)
    }

    /// Serializes the values read so far. Lazy attributes not read yet are
    /// left out.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .tracker
            .values()
            .iter()
            .filter(|(name, _)| !self.lazy.contains(*name))
            .map(|(name, value)| (name.clone(), serde_json::to_value(value).unwrap_or_default()))
            .collect();
        serde_json::Value::Object(map)
    }

    fn capture(&self) -> AttributeSnapshot {
        AttributeSnapshot {
            tracker: self.tracker.snapshot(),
            object_id: self.object_id.clone(),
            pending_object_id: self.pending_object_id.clone(),
            state: self.state,
            lazy: self.lazy.clone(),
            rows: self.rows.clone(),
        }
    }

    fn reinstate(&mut self, snapshot: AttributeSnapshot) {
        self.tracker.restore(snapshot.tracker);
        self.object_id = snapshot.object_id;
        self.pending_object_id = snapshot.pending_object_id;
        self.state = snapshot.state;
        self.lazy = snapshot.lazy;
        self.rows = snapshot.rows;
    }

    /// Returns true if `object_id` has no stored value row yet.
    ///
    /// Rows read so far are not enough: lazy attributes and values that
    /// collapsed to their default leave `rows` empty for stored objects.
    fn is_new_object(&self, connection: &dyn Connection, object_id: &Value) -> CoreResult<bool> {
        if self.state == LoadState::NewPrepared {
            return Ok(true);
        }
        if !self.rows.is_empty() {
            return Ok(false);
        }
        let stored = connection.select_one(self.set.values(), &self.object_filter(object_id)?)?;
        Ok(stored.is_none())
    }

    /// Stamps the configured audit attributes that exist in the set and
    /// were not changed by the caller.
    fn stamp_audit(&mut self, connection: &dyn Connection, object_id: &Value) -> CoreResult<()> {
        let audit = self.session.config().audit.clone();
        let now = chrono::Local::now().format(AUDIT_TIME_FORMAT).to_string();
        let actor = self.session.actor().map(str::to_string);

        let mut stamps = Vec::new();
        if self.is_new_object(connection, object_id)? {
            stamps.push((audit.created_at, Some(now.clone())));
            stamps.push((audit.created_by, actor.clone()));
        }
        stamps.push((audit.modified_at, Some(now)));
        stamps.push((audit.modified_by, actor));

        for (name, value) in stamps {
            let Some(value) = value else { continue };
            if name.is_empty() || self.tracker.is_field_dirty(&name) {
                continue;
            }
            let Ok(definition) = self.definition(&name) else {
                continue;
            };
            let value = match definition.data_type.coerce(Value::Text(value)) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(set = self.set.name(), attribute = %name, %err, "audit stamp skipped");
                    continue;
                }
            };
            self.load_lazy_attribute(Some(&[name.as_str()]))?;
            self.tracker.record_change(&name, value);
        }
        Ok(())
    }

    /// Writes every changed value under `object_id`.
    fn write_values(&mut self, connection: &dyn Connection, object_id: &Value) -> CoreResult<()> {
        let entity_type_id = self.set.require_entity_type_id()?;
        let table = self.set.values().to_string();
        let changed = self.tracker.changed_values();

        for (name, value) in changed {
            let definition = self.definition(&name)?.clone();
            let row_id = self.rows.get(&name).cloned();
            let encoding = self.session.encoding();

            if definition.delete_on_default
                && encoding.same_encoding(&value, &definition.default, definition.data_type)
            {
                if let Some(row_id) = row_id {
                    connection.delete(&table, &Filter::all().eq(value_columns::ID, row_id))?;
                    self.rows.remove(&name);
                    tracing::debug!(set = self.set.name(), attribute = %name, "deleted default value row");
                }
                continue;
            }

            let raw = Value::Text(encoding.encode(&value, definition.data_type)?);
            match row_id {
                Some(row_id) => {
                    let mut values = Row::new();
                    values.insert(value_columns::VALUE.to_string(), raw);
                    connection.update(&table, &values, &Filter::all().eq(value_columns::ID, row_id))?;
                    tracing::debug!(set = self.set.name(), attribute = %name, "updated value row");
                }
                None => {
                    let mut row = Row::new();
                    row.insert(value_columns::ENTITY_TYPE_ID.to_string(), Value::Integer(entity_type_id));
                    row.insert(value_columns::OBJECT_ID.to_string(), object_id.clone());
                    row.insert(value_columns::ATTRIBUTE_ID.to_string(), Value::Integer(definition.id));
                    row.insert(value_columns::VALUE.to_string(), raw);
                    if let Some(id) = connection.insert(&table, &row)? {
                        self.rows.insert(name.clone(), id);
                    }
                    tracing::debug!(set = self.set.name(), attribute = %name, "inserted value row");
                }
            }
        }
        Ok(())
    }

    /// Moves every stored row of the current object to `new_id`.
    fn move_rows(&self, connection: &dyn Connection, old_id: &Value, new_id: &Value) -> CoreResult<u64> {
        let mut values = Row::new();
        values.insert(value_columns::OBJECT_ID.to_string(), new_id.clone());
        let moved = connection.update(self.set.values(), &values, &self.object_filter(old_id)?)?;
        Ok(moved)
    }

    /// Turns store failures into recorded errors; other failures stay hard.
    fn soften(&mut self, result: CoreResult<()>) -> CoreResult<bool> {
        match result {
            Ok(()) => Ok(true),
            Err(CoreError::Store(err)) => {
                self.sink.error(ActionError::store(self.set.name(), &err));
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

impl Persistable for AttributeStore {
    fn label(&self) -> &str {
        self.set.name()
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn resource(&self) -> &str {
        self.set.resource_name()
    }

    fn is_new(&self) -> bool {
        false
    }

    fn has_changes(&self) -> bool {
        AttributeStore::has_changes(self)
    }

    fn is_read_only(&self) -> bool {
        AttributeStore::is_read_only(self)
    }

    fn can_delete(&self) -> bool {
        AttributeStore::can_delete(self)
    }

    fn sink_mut(&mut self) -> &mut ActionErrorSink {
        &mut self.sink
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot::Attributes(Box::new(self.capture()))
    }

    fn restore(&mut self, snapshot: NodeSnapshot) {
        let NodeSnapshot::Attributes(snapshot) = snapshot else {
            tracing::error!(set = self.set.name(), "snapshot kind mismatch, not restored");
            return;
        };
        self.reinstate(*snapshot);
    }

    fn before_save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool> {
        self.sink.clear();
        self.own_snapshot = Some(self.capture());
        if !options.run_validation {
            return Ok(true);
        }
        let mut valid = true;
        for (name, value) in self.tracker.changed_values() {
            if !value.is_null() {
                continue;
            }
            if self.definition(&name).is_ok_and(|d| !d.nullable) {
                self.sink
                    .error(ActionError::field(self.set.name(), name, "may not be null"));
                valid = false;
            }
        }
        Ok(valid)
    }

    fn save_all_internal(&mut self, _options: SaveOptions) -> CoreResult<bool> {
        if !self.has_changes() {
            return Ok(true);
        }
        let object_id = self
            .object_id
            .clone()
            .ok_or_else(|| CoreError::missing_object_id(self.set.name()))?;
        let connection = self.session.connection(self.set.resource_name())?;

        if self.tracker.is_dirty() {
            let stamped = self.stamp_audit(connection.as_ref(), &object_id);
            if !self.soften(stamped)? {
                return Ok(false);
            }
        }
        let written = self.write_values(connection.as_ref(), &object_id);
        if !self.soften(written)? {
            return Ok(false);
        }

        if let Some(new_id) = self.pending_object_id.clone() {
            let moved = self.move_rows(connection.as_ref(), &object_id, &new_id);
            match moved {
                Ok(count) => {
                    tracing::debug!(set = self.set.name(), from = %object_id, to = %new_id, count, "moved value rows");
                    self.object_id = Some(new_id);
                    self.pending_object_id = None;
                }
                Err(err) => return self.soften(Err(err)),
            }
        }
        self.state = LoadState::Loaded;
        Ok(true)
    }

    fn after_save_all_internal(&mut self, _had_changes: bool) {
        self.tracker.mark_saved();
        self.own_snapshot = None;
    }

    fn after_save_all_failed_internal(&mut self) {
        if let Some(snapshot) = self.own_snapshot.take() {
            self.reinstate(snapshot);
        }
    }

    fn before_delete_full_internal(&mut self) -> CoreResult<bool> {
        self.sink.clear();
        self.own_snapshot = Some(self.capture());
        Ok(true)
    }

    fn delete_full_internal(&mut self) -> CoreResult<bool> {
        let Some(object_id) = self.object_id.clone() else {
            return Ok(true);
        };
        let filter = self.object_filter(&object_id)?;
        let connection = self.session.connection(self.set.resource_name())?;
        match connection.delete(self.set.values(), &filter) {
            Ok(count) => {
                tracing::debug!(set = self.set.name(), object_id = %object_id, count, "deleted value rows");
                Ok(true)
            }
            Err(err) => {
                self.sink.error(ActionError::store(self.set.name(), &err));
                Ok(false)
            }
        }
    }

    fn after_delete_full_internal(&mut self) {
        self.state = LoadState::Unloaded;
        self.tracker = ChangeTracker::loaded(BTreeMap::new());
        self.pending_object_id = None;
        self.lazy.clear();
        self.rows.clear();
        self.own_snapshot = None;
    }

    fn after_delete_full_failed_internal(&mut self) {
        if let Some(snapshot) = self.own_snapshot.take() {
            self.reinstate(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeDefinition;
    use crate::catalog::Catalog;
    use crate::config::{AuditNames, Config};
    use cascade_store::{MemoryConnection, Operation, ResourceRegistry};
    use cascade_value::{DataType, TextEncoding};

    const SET: &str = "ticket_attributes";
    const TYPE_ID: i64 = 3;

    fn definitions() -> Vec<AttributeDefinition> {
        vec![
            AttributeDefinition::new(1, "priority", DataType::Integer)
                .default_value(3i64)
                .delete_on_default(),
            AttributeDefinition::new(2, "label", DataType::Text),
            AttributeDefinition::new(3, "notes", DataType::Text).lazy(),
            AttributeDefinition::new(4, "modified_at", DataType::Timestamp),
        ]
    }

    fn setup(config: Config) -> (Session, Arc<MemoryConnection>) {
        let conn = Arc::new(MemoryConnection::new());
        conn.create_table(AttributeSetDef::definitions_schema("attribute_definitions"));
        conn.create_table(AttributeSetDef::values_schema("attribute_values"));
        let enc = TextEncoding::default();
        for definition in definitions() {
            conn.insert("attribute_definitions", &definition.to_row(TYPE_ID, &enc).unwrap())
                .unwrap();
        }
        let catalog = Catalog::new().with_attributes(AttributeSetDef::new(SET).entity_type_id(TYPE_ID));
        let registry = ResourceRegistry::new().with("default", conn.clone());
        let session = Session::builder(registry, catalog).config(config).build();
        (session, conn)
    }

    fn value_row(conn: &MemoryConnection, object_id: i64, attribute_id: i64, raw: &str) {
        let mut row = Row::new();
        row.insert(value_columns::ENTITY_TYPE_ID.into(), Value::Integer(TYPE_ID));
        row.insert(value_columns::OBJECT_ID.into(), Value::Integer(object_id));
        row.insert(value_columns::ATTRIBUTE_ID.into(), Value::Integer(attribute_id));
        row.insert(value_columns::VALUE.into(), Value::from(raw));
        conn.insert("attribute_values", &row).unwrap();
    }

    fn rows_for(conn: &MemoryConnection, attribute_id: i64) -> Vec<Row> {
        conn.rows("attribute_values")
            .into_iter()
            .filter(|r| r.get("attribute_id") == Some(&Value::Integer(attribute_id)))
            .collect()
    }

    #[test]
    fn without_object_id_defaults_are_prepared() {
        let (session, _conn) = setup(Config::default());
        let mut store = AttributeStore::new(&session, SET, None).unwrap();
        assert_eq!(store.get("priority").unwrap(), Value::Integer(3));
        assert_eq!(store.state(), LoadState::NewPrepared);
        assert!(store.lazy_attributes().is_empty());
        assert!(!store.has_changes());
    }

    #[test]
    fn loads_values_and_defers_lazy_ones() {
        let (session, conn) = setup(Config::default());
        value_row(&conn, 7, 1, "5");
        value_row(&conn, 7, 3, "stored note");

        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        assert_eq!(store.get("priority").unwrap(), Value::Integer(5));
        assert!(store.lazy_attributes().contains("notes"));

        assert_eq!(store.get("notes").unwrap(), Value::from("stored note"));
        assert!(store.lazy_attributes().is_empty());
        assert!(!store.has_changes());
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let (session, _conn) = setup(Config::default());
        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        assert!(matches!(store.get("missing"), Err(CoreError::UnknownField { .. })));
        assert!(matches!(store.set("missing", 1i64), Err(CoreError::UnknownField { .. })));
    }

    #[test]
    fn saving_default_deletes_the_row() {
        let (session, conn) = setup(Config::default());
        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();

        store.set("priority", 9i64).unwrap();
        assert!(store.save_all().unwrap());
        let rows = rows_for(&conn, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("value"), Some(&Value::from("9")));

        store.set("priority", "3").unwrap();
        assert!(store.save_all().unwrap());
        assert!(rows_for(&conn, 1).is_empty());
        assert_eq!(store.get("priority").unwrap(), Value::Integer(3));
    }

    #[test]
    fn null_is_stored_as_token() {
        let (session, conn) = setup(Config::default());
        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        store.set("label", "x").unwrap();
        store.save_all().unwrap();
        store.set("label", Value::Null).unwrap();
        store.save_all().unwrap();

        let rows = rows_for(&conn, 2);
        assert_eq!(rows[0].get("value"), Some(&Value::from("__NULL__")));

        let mut fresh = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        assert_eq!(fresh.get("label").unwrap(), Value::Null);
    }

    #[test]
    fn saving_without_object_id_is_a_hard_error() {
        let (session, _conn) = setup(Config::default());
        let mut store = AttributeStore::new(&session, SET, None).unwrap();
        store.set("label", "x").unwrap();
        assert!(matches!(store.save_all(), Err(CoreError::MissingObjectId { .. })));
        assert!(store.has_changes());
    }

    #[test]
    fn object_id_change_waits_for_save() {
        let (session, conn) = setup(Config::default());
        value_row(&conn, 7, 2, "old");
        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        store.get("label").unwrap();

        store.assign_object_id(Value::Integer(8));
        assert_eq!(store.object_id(), Some(&Value::Integer(7)));
        assert!(store.has_changes());

        assert!(store.save_all().unwrap());
        assert_eq!(store.object_id(), Some(&Value::Integer(8)));
        assert_eq!(rows_for(&conn, 2)[0].get("object_id"), Some(&Value::Integer(8)));
    }

    #[test]
    fn failed_write_restores_values() {
        let (session, conn) = setup(Config::default());
        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        store.set("label", "x").unwrap();
        conn.fail_next(Operation::Insert, Some("attribute_values"));

        assert!(!store.save_all().unwrap());
        assert_eq!(store.errors().len(), 1);
        assert!(store.tracker().is_field_dirty("label"));
        assert!(rows_for(&conn, 2).is_empty());
    }

    #[test]
    fn audit_attributes_are_stamped() {
        let config = Config::default().audit(AuditNames::default());
        let (session, conn) = setup(config);
        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        store.set("label", "x").unwrap();
        store.save_all().unwrap();

        let stamped = rows_for(&conn, 4);
        assert_eq!(stamped.len(), 1);
        let raw = stamped[0].get("value").and_then(Value::as_text).unwrap().to_string();
        assert_eq!(raw.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn lazy_created_stamp_survives_later_saves() {
        let config = Config::default().audit(AuditNames::default());
        let (session, conn) = setup(config);
        let created_at = AttributeDefinition::new(5, "created_at", DataType::Timestamp).lazy();
        conn.insert(
            "attribute_definitions",
            &created_at.to_row(TYPE_ID, &TextEncoding::default()).unwrap(),
        )
        .unwrap();

        let mut store = AttributeStore::new(&session, SET, None).unwrap();
        store.set("label", "x").unwrap();
        store.assign_object_id(Value::Integer(7));
        assert!(store.save_all().unwrap());
        assert_eq!(rows_for(&conn, 5).len(), 1);

        let original = Value::from("2001-02-03 04:05:06");
        let mut values = Row::new();
        values.insert(value_columns::VALUE.into(), original.clone());
        conn.update("attribute_values", &values, &Filter::all().eq("attribute_id", 5i64))
            .unwrap();
        conn.delete("attribute_values", &Filter::all().eq("attribute_id", 2i64))
            .unwrap();
        conn.delete("attribute_values", &Filter::all().eq("attribute_id", 4i64))
            .unwrap();

        let mut reopened = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        reopened.set("label", "y").unwrap();
        assert!(reopened.lazy_attributes().contains("created_at"));
        assert!(reopened.save_all().unwrap());

        let created = rows_for(&conn, 5);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].get("value"), Some(&original));
        assert_eq!(rows_for(&conn, 4).len(), 1);
    }

    #[test]
    fn delete_removes_every_row_and_tolerates_none() {
        let (session, conn) = setup(Config::default());
        value_row(&conn, 7, 1, "5");
        value_row(&conn, 7, 2, "a");
        value_row(&conn, 9, 2, "other");

        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        assert!(store.delete_full().unwrap());
        assert_eq!(conn.rows("attribute_values").len(), 1);
        assert!(store.delete_full().unwrap());
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let (session, _conn) = setup(Config::default().default_read_only(true));
        let mut store = AttributeStore::new(&session, SET, Some(Value::Integer(7))).unwrap();
        assert!(matches!(store.set("label", "x"), Err(CoreError::ReadOnly { .. })));
    }
}
