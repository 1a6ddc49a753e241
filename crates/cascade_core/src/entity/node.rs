//! A single entity and its populated relations.

use super::entity_type::EntityType;
use crate::attribute::AttributeStore;
use crate::collection::CollectionNode;
use crate::error::{CoreError, CoreResult};
use crate::node::{
    delete_nested, save_nested, ChildChangeRecord, EntitySnapshot, NodeSnapshot, Persistable,
    RelatedNode, SaveOptions,
};
use crate::orchestrator;
use crate::policy::{ActionError, ActionErrorSink, MutabilityPolicy, ParentLink};
use crate::relation::{Pass, RelationDescriptor, RelationKind, RelationTarget};
use crate::session::Session;
use crate::tracker::{ChangeTracker, TrackerSnapshot};
use cascade_store::{Filter, Row, TableSchema};
use cascade_value::{DataType, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One row of an entity type, with the relations populated on it.
///
/// Field access is checked against the table schema: unknown fields are an
/// error and values are coerced to the column type. Saving and deleting
/// cascade through the populated relations according to their descriptors.
#[derive(Debug, Clone)]
pub struct EntityNode {
    session: Session,
    entity_type: Arc<EntityType>,
    schema: TableSchema,
    tracker: ChangeTracker,
    relations: BTreeMap<String, RelatedNode>,
    policy: MutabilityPolicy,
    parent: Option<ParentLink>,
    sink: ActionErrorSink,
    records: BTreeMap<String, ChildChangeRecord>,
    own_snapshot: Option<TrackerSnapshot>,
    loaded_for_delete: Vec<String>,
}

fn takes_part_in_save(relation: &RelationDescriptor, options: SaveOptions) -> bool {
    relation.cascades_save() || options.push
}

/// Copies the linked columns of `relation` in the direction of `pass`.
fn copy_link(
    from: &ChangeTracker,
    to: &mut ChangeTracker,
    relation: &RelationDescriptor,
    pass: Pass,
) {
    for column in relation.link_columns() {
        let (source, target) = match pass {
            Pass::FromParent => (&column.local, &column.remote),
            Pass::FromChild => (&column.remote, &column.local),
        };
        let value = from.value(source);
        if to.value(target) != value {
            tracing::debug!(
                relation = relation.name(),
                column = %target,
                value = %value,
                ?pass,
                "copied link value"
            );
            to.record_change(target, value);
        }
    }
}

impl EntityNode {
    /// Creates a new, unsaved entity with the column defaults filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if the type, its resource or its table is unknown.
    pub fn new(session: &Session, type_name: &str) -> CoreResult<Self> {
        let entity_type = session.entity_type(type_name)?;
        let schema = session.table_schema(entity_type.resource_name(), entity_type.table())?;
        let mut tracker = ChangeTracker::new_record();
        for column in schema.columns() {
            if let Some(default) = &column.default {
                tracker.load_value(column.name.clone(), default.clone());
            }
        }
        Ok(Self::from_parts(session, entity_type, schema, tracker))
    }

    /// Creates a clean node for a stored row.
    pub(crate) fn from_row(
        session: &Session,
        entity_type: Arc<EntityType>,
        row: Row,
    ) -> CoreResult<Self> {
        let schema = session.table_schema(entity_type.resource_name(), entity_type.table())?;
        Ok(Self::from_parts(
            session,
            entity_type,
            schema,
            ChangeTracker::loaded(row),
        ))
    }

    fn from_parts(
        session: &Session,
        entity_type: Arc<EntityType>,
        schema: TableSchema,
        tracker: ChangeTracker,
    ) -> Self {
        let policy = entity_type.policy();
        Self {
            session: session.clone(),
            entity_type,
            schema,
            tracker,
            relations: BTreeMap::new(),
            policy,
            parent: None,
            sink: ActionErrorSink::default(),
            records: BTreeMap::new(),
            own_snapshot: None,
            loaded_for_delete: Vec::new(),
        }
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.entity_type.name()
    }

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Returns the session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the table schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the change tracker.
    #[must_use]
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Returns true if the row has not been stored yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.tracker.is_new()
    }

    /// Returns the primary key value, null until stored.
    #[must_use]
    pub fn primary_key(&self) -> Value {
        self.tracker.value(self.entity_type.primary_key())
    }

    fn check_field(&self, field: &str) -> CoreResult<DataType> {
        self.schema
            .column_named(field)
            .map(|c| c.data_type)
            .ok_or_else(|| CoreError::unknown_field(self.type_name(), field))
    }

    /// Returns a field value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if the table has no such column.
    pub fn get(&self, field: &str) -> CoreResult<Value> {
        self.check_field(field)?;
        Ok(self.tracker.value(field))
    }

    /// Returns a field as an integer.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown fields and values that do not convert.
    pub fn get_integer(&self, field: &str) -> CoreResult<Option<i64>> {
        Ok(DataType::Integer.coerce(self.get(field)?)?.as_integer())
    }

    /// Returns a field as a float.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown fields and values that do not convert.
    pub fn get_float(&self, field: &str) -> CoreResult<Option<f64>> {
        Ok(DataType::Float.coerce(self.get(field)?)?.as_float())
    }

    /// Returns a field as a boolean.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown fields and values that do not convert.
    pub fn get_bool(&self, field: &str) -> CoreResult<Option<bool>> {
        Ok(DataType::Boolean.coerce(self.get(field)?)?.as_bool())
    }

    /// Returns a field as text.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown fields and values that do not convert.
    pub fn get_text(&self, field: &str) -> CoreResult<Option<String>> {
        Ok(DataType::Text
            .coerce(self.get(field)?)?
            .as_text()
            .map(str::to_string))
    }

    /// Sets a field, coercing the value to the column type. Returns true if
    /// the value changed.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` for read-only entities, `UnknownField` for fields
    /// the table lacks and a value error if the value does not convert.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> CoreResult<bool> {
        if self.is_read_only() {
            return Err(CoreError::read_only(self.type_name()));
        }
        let data_type = self.check_field(field)?;
        let value = data_type.coerce(value.into())?;
        Ok(self.tracker.record_change(field, value))
    }

    /// Returns true if any field changed.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    /// Returns true if `field` changed.
    #[must_use]
    pub fn is_field_dirty(&self, field: &str) -> bool {
        self.tracker.is_field_dirty(field)
    }

    /// Returns field to original value for every changed field.
    #[must_use]
    pub fn dirty_fields(&self) -> &BTreeMap<String, Value> {
        self.tracker.dirty_fields()
    }

    /// Returns true if the entity or any populated relation has unsaved
    /// changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.tracker.is_dirty() || self.relations.values().any(RelatedNode::has_changes)
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

    /// Sets or clears the can-delete flag.
    pub fn set_can_delete(&mut self, value: Option<bool>) {
        self.policy.set_can_delete(value);
    }

    /// Returns true if the entity may not change.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.policy.is_read_only(self.session.config())
    }

    /// Returns true if the entity may be deleted.
    #[must_use]
    pub fn can_delete(&self) -> bool {
        self.policy.can_delete(self.session.config())
    }

    /// Returns the relation this entity was attached through.
    #[must_use]
    pub fn parent_link(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    /// Returns the errors of the last operation, including those of every
    /// node it cascaded into.
    #[must_use]
    pub fn errors(&self) -> &[ActionError] {
        self.sink.errors()
    }

    /// Returns the warnings of the last operation.
    #[must_use]
    pub fn warnings(&self) -> &[ActionError] {
        self.sink.warnings()
    }

    pub(crate) fn attach(&mut self, policy: MutabilityPolicy, parent: Option<ParentLink>) {
        self.policy = self.policy.overlay(policy);
        if parent.is_some() {
            self.parent = parent;
        }
    }

    fn descriptor(&self, name: &str) -> CoreResult<RelationDescriptor> {
        self.entity_type
            .relation_named(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_relation(self.type_name(), name))
    }

    fn parent_link_for(&self, relation: &RelationDescriptor) -> ParentLink {
        let filled_columns = if relation.link_kind().rule(Pass::FromParent).is_some() {
            relation
                .link_columns()
                .iter()
                .map(|c| c.remote.clone())
                .collect()
        } else {
            Vec::new()
        };
        ParentLink {
            parent_type: self.type_name().to_string(),
            relation: relation.name().to_string(),
            filled_columns,
        }
    }

    fn insert_relation(&mut self, relation: &RelationDescriptor, mut node: RelatedNode) {
        let parent = match relation.kind() {
            RelationKind::BelongsTo => None,
            _ => Some(self.parent_link_for(relation)),
        };
        node.attach(relation.policy(), parent);
        self.relations.insert(relation.name().to_string(), node);
    }

    /// Value this entity contributes as the object id of an attribute
    /// relation.
    fn object_id_for(&self, relation: &RelationDescriptor) -> Value {
        match relation.link_columns().first() {
            Some(column) => self.tracker.value(&column.local),
            None => self.primary_key(),
        }
    }

    /// Returns a populated relation.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelatedNode> {
        self.relations.get(name)
    }

    /// Returns a populated relation mutably.
    pub fn relation_mut(&mut self, name: &str) -> Option<&mut RelatedNode> {
        self.relations.get_mut(name)
    }

    /// Detaches a populated relation.
    pub fn take_relation(&mut self, name: &str) -> Option<RelatedNode> {
        self.relations.remove(name)
    }

    /// Attaches a single related entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the relation is unknown or does not point at a
    /// single entity of the given type.
    pub fn set_one(&mut self, name: &str, entity: EntityNode) -> CoreResult<()> {
        let relation = self.descriptor(name)?;
        match relation.target() {
            RelationTarget::Entity(target) if target == entity.type_name() => {
                self.insert_relation(&relation, RelatedNode::Entity(Box::new(entity)));
                Ok(())
            }
            target => Err(CoreError::relation_target(
                name,
                target.name(),
                entity.type_name(),
            )),
        }
    }

    /// Attaches a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the relation is unknown or does not point at a
    /// collection of the given member type.
    pub fn set_many(&mut self, name: &str, collection: CollectionNode) -> CoreResult<()> {
        let relation = self.descriptor(name)?;
        match relation.target() {
            RelationTarget::Collection(target) if target == collection.member_type().name() => {
                self.insert_relation(&relation, RelatedNode::Collection(collection));
                Ok(())
            }
            target => Err(CoreError::relation_target(
                name,
                target.name(),
                collection.member_type().name(),
            )),
        }
    }

    /// Returns a populated single-entity relation.
    #[must_use]
    pub fn one(&self, name: &str) -> Option<&EntityNode> {
        self.relations.get(name).and_then(RelatedNode::as_entity)
    }

    /// Returns a populated single-entity relation mutably.
    pub fn one_mut(&mut self, name: &str) -> Option<&mut EntityNode> {
        self.relations.get_mut(name).and_then(RelatedNode::as_entity_mut)
    }

    /// Returns a populated collection relation.
    #[must_use]
    pub fn many(&self, name: &str) -> Option<&CollectionNode> {
        self.relations.get(name).and_then(RelatedNode::as_collection)
    }

    /// Returns a collection relation, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the relation is unknown or not a collection.
    pub fn many_mut(&mut self, name: &str) -> CoreResult<&mut CollectionNode> {
        let relation = self.descriptor(name)?;
        let RelationTarget::Collection(member) = relation.target() else {
            return Err(CoreError::relation_target(
                name,
                relation.target().name(),
                "collection",
            ));
        };
        if !self.relations.contains_key(name) {
            let collection = CollectionNode::new(&self.session, member)?;
            self.insert_relation(&relation, RelatedNode::Collection(collection));
        }
        match self.relations.get_mut(name) {
            Some(RelatedNode::Collection(collection)) => Ok(collection),
            Some(other) => Err(CoreError::relation_target(
                name,
                "collection",
                other.kind_name(),
            )),
            None => Err(CoreError::unknown_relation(self.entity_type.name(), name)),
        }
    }

    /// Returns a populated attribute relation.
    #[must_use]
    pub fn attributes(&self, name: &str) -> Option<&AttributeStore> {
        self.relations.get(name).and_then(RelatedNode::as_attributes)
    }

    /// Returns an attribute relation, opening the store if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the relation is unknown or not an attribute set.
    pub fn attributes_mut(&mut self, name: &str) -> CoreResult<&mut AttributeStore> {
        let relation = self.descriptor(name)?;
        let RelationTarget::Attributes(set) = relation.target() else {
            return Err(CoreError::relation_target(
                name,
                relation.target().name(),
                "attributes",
            ));
        };
        if !self.relations.contains_key(name) {
            let object_id = Some(self.object_id_for(&relation)).filter(|id| !id.is_null());
            let store = AttributeStore::new(&self.session, set, object_id)?;
            self.insert_relation(&relation, RelatedNode::Attributes(store));
        }
        match self.relations.get_mut(name) {
            Some(RelatedNode::Attributes(store)) => Ok(store),
            Some(other) => Err(CoreError::relation_target(
                name,
                "attributes",
                other.kind_name(),
            )),
            None => Err(CoreError::unknown_relation(self.entity_type.name(), name)),
        }
    }

    /// Loads a relation from the store by its link columns, replacing
    /// whatever was populated. Returns true if anything was found.
    ///
    /// # Errors
    ///
    /// Returns an error if the relation is unknown or the query fails.
    pub fn load_related(&mut self, name: &str) -> CoreResult<bool> {
        let relation = self.descriptor(name)?;
        if let RelationTarget::Attributes(set) = relation.target() {
            let object_id = self.object_id_for(&relation);
            if object_id.is_null() {
                return Ok(false);
            }
            let store = AttributeStore::new(&self.session, set, Some(object_id))?;
            self.insert_relation(&relation, RelatedNode::Attributes(store));
            return Ok(true);
        }

        let mut filter = Filter::all();
        for column in relation.link_columns() {
            let value = self.tracker.value(&column.local);
            if value.is_null() {
                return Ok(false);
            }
            filter = filter.eq(column.remote.clone(), value);
        }
        if filter.predicates().is_empty() {
            return Ok(false);
        }

        match relation.target() {
            RelationTarget::Entity(target) => {
                let found = self.session.find_all(target, &filter)?.into_iter().next();
                match found {
                    Some(entity) => {
                        self.insert_relation(&relation, RelatedNode::Entity(Box::new(entity)));
                        Ok(true)
                    }
                    None => {
                        self.relations.remove(name);
                        Ok(false)
                    }
                }
            }
            RelationTarget::Collection(target) => {
                let mut collection = CollectionNode::new(&self.session, target)?;
                collection.load(&filter)?;
                let found = !collection.is_empty();
                self.insert_relation(&relation, RelatedNode::Collection(collection));
                Ok(found)
            }
            RelationTarget::Attributes(_) => Ok(false),
        }
    }

    /// Returns true if a populated child that saves first will hand its
    /// key to `column`.
    fn filled_by_child(&self, column: &str, options: SaveOptions) -> bool {
        self.entity_type.relations().iter().any(|relation| {
            takes_part_in_save(relation, options)
                && relation.link_kind().rule(Pass::FromChild).is_some()
                && relation.link_columns().iter().any(|c| c.local == column)
                && matches!(
                    self.relations.get(relation.name()),
                    Some(RelatedNode::Entity(child))
                        if !child.is_read_only() && (!child.is_new() || child.has_changes())
                )
        })
    }

    /// Runs schema checks and the type's validation hook. Problems are
    /// recorded as errors; returns true if there were none.
    pub fn validate(&mut self) -> bool {
        self.validate_with(SaveOptions::default())
    }

    fn validate_with(&mut self, options: SaveOptions) -> bool {
        let mut problems = Vec::new();
        let check_length = self.session.config().check_string_length;
        for column in self.schema.columns() {
            let value = self.tracker.value(&column.name);
            if value.is_null() {
                let filled = self.parent.as_ref().is_some_and(|p| p.fills(&column.name))
                    || self.filled_by_child(&column.name, options);
                if !column.may_be_omitted() && !filled {
                    problems.push((column.name.clone(), "is required".to_string()));
                }
                continue;
            }
            if let (true, Some(size), Some(text)) = (check_length, column.size, value.as_text()) {
                if text.chars().count() > size {
                    problems.push((column.name.clone(), format!("exceeds {size} characters")));
                }
            }
        }
        let hooks = self.entity_type.hooks();
        for (field, messages) in hooks.validate(self) {
            problems.extend(messages.into_iter().map(|m| (field.clone(), m)));
        }

        let valid = problems.is_empty();
        for (field, message) in problems {
            self.sink
                .error(ActionError::field(self.entity_type.name(), field, message));
        }
        valid
    }

    /// Saves the entity and every cascading relation with default options.
    ///
    /// Returns `Ok(false)` if validation or a store write failed; the
    /// errors are available from [`errors`](Self::errors) and every node
    /// is back in the state it had before the call.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` for read-only entities, `EmptyNewRecord` for a new
    /// entity without values, and configuration errors.
    pub fn save_all(&mut self) -> CoreResult<bool> {
        self.save_all_with(SaveOptions::default())
    }

    /// Saves the entity and every cascading relation.
    ///
    /// # Errors
    ///
    /// See [`save_all`](Self::save_all).
    pub fn save_all_with(&mut self, options: SaveOptions) -> CoreResult<bool> {
        orchestrator::save_all(self, options)
    }

    /// Deletes the entity and every relation that cascades on delete.
    ///
    /// Relations that cascade but are not populated are loaded first. On
    /// success the deleted relations are detached and the entity is new
    /// again.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` or `DeleteForbidden` if the entity may not be
    /// deleted, and configuration errors.
    pub fn delete_full(&mut self) -> CoreResult<bool> {
        orchestrator::delete_full(self)
    }

    /// Serializes the fields, and with `full` every populated relation
    /// marked for serialization.
    #[must_use]
    pub fn to_json(&self, full: bool) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, value) in self.tracker.values() {
            map.insert(field.clone(), serde_json::to_value(value).unwrap_or_default());
        }
        if full {
            for relation in self.entity_type.relations() {
                if !relation.serializes() {
                    continue;
                }
                if let Some(node) = self.relations.get(relation.name()) {
                    map.insert(relation.name().to_string(), node.to_json(full));
                }
            }
        }
        serde_json::Value::Object(map)
    }

    fn save_row(&mut self) -> CoreResult<bool> {
        let connection = self.session.connection(self.entity_type.resource_name())?;
        let table = self.entity_type.table();
        let pk = self.entity_type.primary_key();

        if self.tracker.is_new() {
            let row: Row = self.tracker.values().clone();
            match connection.insert(table, &row) {
                Ok(key) => {
                    if let Some(key) = key {
                        self.tracker.load_value(pk, key);
                    }
                    self.tracker.mark_saved();
                    tracing::debug!(entity = self.type_name(), key = %self.primary_key(), "inserted");
                    Ok(true)
                }
                Err(err) => {
                    self.sink.error(ActionError::store(self.entity_type.name(), &err));
                    Ok(false)
                }
            }
        } else {
            let changes = self.tracker.changed_values();
            let filter = Filter::all().eq(pk, self.tracker.original(pk));
            match connection.update(table, &changes, &filter) {
                Ok(_) => {
                    self.tracker.mark_saved();
                    tracing::debug!(entity = self.type_name(), key = %self.primary_key(), "updated");
                    Ok(true)
                }
                Err(err) => {
                    self.sink.error(ActionError::store(self.entity_type.name(), &err));
                    Ok(false)
                }
            }
        }
    }

    fn delete_row(&mut self) -> CoreResult<bool> {
        let connection = self.session.connection(self.entity_type.resource_name())?;
        let pk = self.entity_type.primary_key();
        let filter = Filter::all().eq(pk, self.tracker.original(pk));
        match connection.delete(self.entity_type.table(), &filter) {
            Ok(count) => {
                tracing::debug!(entity = self.type_name(), key = %self.primary_key(), count, "deleted");
                Ok(true)
            }
            Err(err) => {
                self.sink.error(ActionError::store(self.entity_type.name(), &err));
                Ok(false)
            }
        }
    }
}

impl Persistable for EntityNode {
    fn label(&self) -> &str {
        self.entity_type.name()
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn resource(&self) -> &str {
        self.entity_type.resource_name()
    }

    fn is_new(&self) -> bool {
        self.tracker.is_new()
    }

    fn has_changes(&self) -> bool {
        EntityNode::has_changes(self)
    }

    fn is_read_only(&self) -> bool {
        EntityNode::is_read_only(self)
    }

    fn can_delete(&self) -> bool {
        EntityNode::can_delete(self)
    }

    fn sink_mut(&mut self) -> &mut ActionErrorSink {
        &mut self.sink
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot::Entity(Box::new(EntitySnapshot {
            tracker: self.tracker.snapshot(),
            relations: self
                .relations
                .iter()
                .map(|(name, node)| (name.clone(), node.snapshot()))
                .collect(),
        }))
    }

    fn restore(&mut self, snapshot: NodeSnapshot) {
        let NodeSnapshot::Entity(snapshot) = snapshot else {
            tracing::error!(entity = self.type_name(), "snapshot kind mismatch, not restored");
            return;
        };
        let EntitySnapshot { tracker, relations } = *snapshot;
        self.tracker.restore(tracker);
        for (name, child) in relations {
            if let Some(node) = self.relations.get_mut(&name) {
                node.restore(child);
            }
        }
    }

    fn before_save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool> {
        self.sink.clear();
        self.records.clear();
        self.own_snapshot = Some(self.tracker.snapshot());

        let mut prepared = true;
        if options.run_validation && self.tracker.is_dirty() {
            prepared &= self.validate_with(options);
        }

        let entity_type = Arc::clone(&self.entity_type);
        for relation in entity_type.relations() {
            if !takes_part_in_save(relation, options) {
                continue;
            }
            let Some(child) = self.relations.get_mut(relation.name()) else {
                continue;
            };
            let has_changes = child.has_changes();
            self.records.insert(
                relation.name().to_string(),
                ChildChangeRecord {
                    has_changes,
                    snapshot: child.snapshot(),
                },
            );
            if !has_changes || child.is_read_only() {
                continue;
            }
            let child_prepared = child.before_save_all_internal(options);
            self.sink.absorb(child.sink_mut());
            prepared &= child_prepared?;
        }
        Ok(prepared)
    }

    fn save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool> {
        let entity_type = Arc::clone(&self.entity_type);
        let was_new = self.tracker.is_new();
        let children_new: BTreeMap<String, bool> = self
            .relations
            .iter()
            .filter_map(|(name, node)| match node {
                RelatedNode::Entity(child) => Some((name.clone(), child.is_new())),
                _ => None,
            })
            .collect();
        let started_new = |name: &str| children_new.get(name).copied().unwrap_or(false);

        // Children whose keys flow upward save first.
        let mut saved_first = Vec::new();
        for relation in entity_type.relations() {
            if !takes_part_in_save(relation, options)
                || relation.link_kind().rule(Pass::FromChild).is_none()
            {
                continue;
            }
            let Some(RelatedNode::Entity(child)) = self.relations.get_mut(relation.name()) else {
                continue;
            };
            saved_first.push(relation.name());
            if child.has_changes() && !save_nested(&mut self.sink, &mut **child, options)? {
                return Ok(false);
            }
            // A child that was never written has no key to hand up.
            if !child.is_new()
                && relation
                    .link_kind()
                    .applies(Pass::FromChild, started_new(relation.name()))
            {
                copy_link(&child.tracker, &mut self.tracker, relation, Pass::FromChild);
            }
        }

        if (self.tracker.is_dirty() || self.tracker.is_new()) && !self.save_row()? {
            return Ok(false);
        }
        if was_new && self.tracker.is_new() {
            return Ok(true);
        }

        // Parent keys flow downward, then the remaining children save.
        for relation in entity_type.relations() {
            if !takes_part_in_save(relation, options) {
                continue;
            }
            let link = relation.link_kind();
            let Some(child) = self.relations.get_mut(relation.name()) else {
                continue;
            };
            match &mut *child {
                RelatedNode::Entity(entity) => {
                    if !entity.is_read_only()
                        && link.applies(Pass::FromParent, started_new(relation.name()))
                    {
                        copy_link(&self.tracker, &mut entity.tracker, relation, Pass::FromParent);
                    }
                }
                RelatedNode::Collection(collection) => {
                    if link.rule(Pass::FromParent).is_some() {
                        for member in collection.members_mut() {
                            if member.has_changes()
                                && !member.is_read_only()
                                && link.applies(Pass::FromParent, member.is_new())
                            {
                                copy_link(&self.tracker, &mut member.tracker, relation, Pass::FromParent);
                            }
                        }
                    }
                }
                RelatedNode::Attributes(store) => {
                    if link.applies(Pass::FromParent, store.object_id().is_none()) {
                        let object_id = match relation.link_columns().first() {
                            Some(column) => self.tracker.value(&column.local),
                            None => self.tracker.value(entity_type.primary_key()),
                        };
                        if !object_id.is_null() {
                            store.assign_object_id(object_id);
                        }
                    }
                }
            }
            // Read-only children were already reported in the first pass.
            let reported = child.is_read_only() && saved_first.contains(&relation.name());
            if child.has_changes() && !reported && !save_nested(&mut self.sink, child, options)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn after_save_all_internal(&mut self, had_changes: bool) {
        let records = std::mem::take(&mut self.records);
        for (name, record) in records {
            if let Some(child) = self.relations.get_mut(&name) {
                child.after_save_all_internal(record.has_changes);
            }
        }
        self.own_snapshot = None;
        let hooks = self.entity_type.hooks();
        hooks.after_save_all(self, had_changes);
    }

    fn after_save_all_failed_internal(&mut self) {
        let records = std::mem::take(&mut self.records);
        for (name, record) in records {
            if let Some(child) = self.relations.get_mut(&name) {
                child.after_save_all_failed_internal();
                child.restore(record.snapshot);
            }
        }
        if let Some(snapshot) = self.own_snapshot.take() {
            self.tracker.restore(snapshot);
        }
        let hooks = self.entity_type.hooks();
        hooks.after_save_all_failed(self);
    }

    fn before_delete_full_internal(&mut self) -> CoreResult<bool> {
        self.sink.clear();
        self.records.clear();
        self.loaded_for_delete.clear();
        self.own_snapshot = Some(self.tracker.snapshot());

        let mut prepared = true;
        let entity_type = Arc::clone(&self.entity_type);
        for relation in entity_type.relations() {
            if !relation.cascades_delete() {
                continue;
            }
            let name = relation.name();
            if !self.relations.contains_key(name) && !self.tracker.is_new() {
                match self.load_related(name) {
                    Ok(true) => self.loaded_for_delete.push(name.to_string()),
                    Ok(false) => {}
                    Err(CoreError::Store(err)) => {
                        self.sink.error(ActionError::store(self.entity_type.name(), &err));
                        prepared = false;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }
            let Some(child) = self.relations.get_mut(name) else {
                continue;
            };
            let snapshot = child.snapshot();
            if !child.can_delete() {
                self.sink
                    .warn(ActionError::new(child.label(), "may not be deleted, skipped"));
                self.records.insert(
                    name.to_string(),
                    ChildChangeRecord {
                        has_changes: false,
                        snapshot,
                    },
                );
                continue;
            }
            self.records.insert(
                name.to_string(),
                ChildChangeRecord {
                    has_changes: true,
                    snapshot,
                },
            );
            let child_prepared = child.before_delete_full_internal();
            self.sink.absorb(child.sink_mut());
            prepared &= child_prepared?;
        }
        Ok(prepared)
    }

    fn delete_full_internal(&mut self) -> CoreResult<bool> {
        let entity_type = Arc::clone(&self.entity_type);
        for relation in entity_type.relations() {
            let takes_part = self
                .records
                .get(relation.name())
                .is_some_and(|r| r.has_changes);
            if !takes_part {
                continue;
            }
            let Some(child) = self.relations.get_mut(relation.name()) else {
                continue;
            };
            if !delete_nested(&mut self.sink, child)? {
                return Ok(false);
            }
        }
        if self.tracker.is_new() {
            return Ok(true);
        }
        self.delete_row()
    }

    fn after_delete_full_internal(&mut self) {
        let records = std::mem::take(&mut self.records);
        for (name, record) in records {
            if !record.has_changes {
                continue;
            }
            if let Some(mut child) = self.relations.remove(&name) {
                child.after_delete_full_internal();
            }
        }
        self.loaded_for_delete.clear();
        self.own_snapshot = None;
        self.tracker.mark_saved();
        self.tracker.set_new(true);
        let hooks = self.entity_type.hooks();
        hooks.after_delete_full(self);
    }

    fn after_delete_full_failed_internal(&mut self) {
        let records = std::mem::take(&mut self.records);
        for (name, record) in records {
            if let Some(child) = self.relations.get_mut(&name) {
                child.after_delete_full_failed_internal();
                child.restore(record.snapshot);
            }
        }
        for name in std::mem::take(&mut self.loaded_for_delete) {
            self.relations.remove(&name);
        }
        if let Some(snapshot) = self.own_snapshot.take() {
            self.tracker.restore(snapshot);
        }
    }
}
