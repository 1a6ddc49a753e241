//! Collection node.

use crate::entity::{EntityNode, EntityType};
use crate::error::{CoreError, CoreResult};
use crate::node::{delete_nested, save_nested, NodeSnapshot, Persistable, SaveOptions};
use crate::orchestrator;
use crate::policy::{ActionError, ActionErrorSink, MutabilityPolicy, ParentLink};
use crate::session::Session;
use cascade_store::Filter;
use cascade_value::Value;
use std::sync::Arc;

/// An ordered, keyed collection of entities of one type.
#[derive(Debug, Clone)]
pub struct CollectionNode {
    session: Session,
    member_type: Arc<EntityType>,
    members: Vec<(Value, EntityNode)>,
    policy: MutabilityPolicy,
    parent: Option<ParentLink>,
    auto_create: bool,
    sink: ActionErrorSink,
    participants: Vec<bool>,
    own_snapshot: Option<Vec<(Value, NodeSnapshot)>>,
}

impl CollectionNode {
    /// Creates an empty collection of `type_name` members.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the member type is not registered.
    pub fn new(session: &Session, type_name: &str) -> CoreResult<Self> {
        let member_type = session.entity_type(type_name)?;
        Ok(Self {
            session: session.clone(),
            member_type,
            members: Vec::new(),
            policy: MutabilityPolicy::default(),
            parent: None,
            auto_create: session.config().auto_create_members,
            sink: ActionErrorSink::default(),
            participants: Vec::new(),
            own_snapshot: None,
        })
    }

    /// Returns the member type.
    #[must_use]
    pub fn member_type(&self) -> &Arc<EntityType> {
        &self.member_type
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.members.iter().map(|(key, _)| key)
    }

    /// Returns key and member pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &EntityNode)> {
        self.members.iter().map(|(key, member)| (key, member))
    }

    /// Returns key and mutable member pairs in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Value, &mut EntityNode)> {
        self.members.iter_mut().map(|(key, member)| (&*key, member))
    }

    pub(crate) fn members_mut(&mut self) -> impl Iterator<Item = &mut EntityNode> {
        self.members.iter_mut().map(|(_, member)| member)
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.members.iter().position(|(k, _)| k == key)
    }

    /// Returns true if a member has `key`.
    #[must_use]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.position(key).is_some()
    }

    /// Returns the member under `key`.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&EntityNode> {
        self.position(key).map(|index| &self.members[index].1)
    }

    /// Returns the member under `key`, creating it if the collection
    /// auto-creates members.
    ///
    /// # Errors
    ///
    /// Returns `MissingMember` if the key is unknown and auto-create is off,
    /// and `ReadOnly` if a member would have to be created in a read-only
    /// collection.
    pub fn get_mut(&mut self, key: impl Into<Value>) -> CoreResult<&mut EntityNode> {
        let key = key.into();
        if let Some(index) = self.position(&key) {
            return Ok(&mut self.members[index].1);
        }
        if !self.auto_create {
            return Err(CoreError::missing_member(
                self.member_type.name(),
                key.to_string(),
            ));
        }
        let member = EntityNode::new(&self.session, self.member_type.name())?;
        self.set(key, member)?;
        let last = self.members.len() - 1;
        Ok(&mut self.members[last].1)
    }

    /// Stores `member` under `key`, replacing any member already there.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` for read-only collections and `MemberType` if the
    /// member has another entity type.
    pub fn set(&mut self, key: impl Into<Value>, mut member: EntityNode) -> CoreResult<()> {
        if self.is_read_only() {
            return Err(CoreError::read_only(self.member_type.name()));
        }
        if member.type_name() != self.member_type.name() {
            return Err(CoreError::member_type(
                self.member_type.name(),
                member.type_name(),
            ));
        }
        member.attach(self.policy, self.parent.clone());
        let key = key.into();
        match self.position(&key) {
            Some(index) => self.members[index].1 = member,
            None => self.members.push((key, member)),
        }
        Ok(())
    }

    fn next_key(&self) -> Value {
        let next = self
            .members
            .iter()
            .filter_map(|(key, _)| key.as_integer())
            .max()
            .map_or(0, |max| max + 1);
        Value::Integer(next)
    }

    /// Appends `member` under the next free integer key and returns the key.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn push(&mut self, member: EntityNode) -> CoreResult<Value> {
        let key = self.next_key();
        self.set(key.clone(), member)?;
        Ok(key)
    }

    /// Appends a new member and returns it.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn push_new(&mut self) -> CoreResult<&mut EntityNode> {
        let member = EntityNode::new(&self.session, self.member_type.name())?;
        self.push(member)?;
        let last = self.members.len() - 1;
        Ok(&mut self.members[last].1)
    }

    /// Detaches the member under `key`. The stored row is not touched.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` for read-only collections.
    pub fn remove(&mut self, key: &Value) -> CoreResult<Option<EntityNode>> {
        if self.is_read_only() {
            return Err(CoreError::read_only(self.member_type.name()));
        }
        Ok(self
            .position(key)
            .map(|index| self.members.remove(index).1))
    }

    /// Replaces the members with the stored rows matching `filter`, keyed by
    /// primary key. Returns the number loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load(&mut self, filter: &Filter) -> CoreResult<usize> {
        let found = self.session.find_all(self.member_type.name(), filter)?;
        self.members.clear();
        for (index, mut member) in found.into_iter().enumerate() {
            let key = match member.primary_key() {
                Value::Null => Value::Integer(index as i64),
                key => key,
            };
            member.attach(self.policy, self.parent.clone());
            self.members.push((key, member));
        }
        Ok(self.members.len())
    }

    /// Sets whether unknown keys create members.
    pub fn set_auto_create(&mut self, value: bool) {
        self.auto_create = value;
    }

    /// Returns the explicit policy flags.
    #[must_use]
    pub fn policy(&self) -> MutabilityPolicy {
        self.policy
    }

    /// Sets or clears the read-only flag of the collection and its members.
    pub fn set_read_only(&mut self, value: Option<bool>) {
        self.policy.set_read_only(value);
        for (_, member) in &mut self.members {
            member.set_read_only(value);
        }
    }

    /// Sets or clears the can-delete flag of the collection and its members.
    pub fn set_can_delete(&mut self, value: Option<bool>) {
        self.policy.set_can_delete(value);
        for (_, member) in &mut self.members {
            member.set_can_delete(value);
        }
    }

    /// Returns true if the collection may not change.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.policy.is_read_only(self.session.config())
    }

    /// Returns true if the collection may be deleted.
    #[must_use]
    pub fn can_delete(&self) -> bool {
        self.policy.can_delete(self.session.config())
    }

    pub(crate) fn attach(&mut self, policy: MutabilityPolicy, parent: Option<ParentLink>) {
        self.policy = self.policy.overlay(policy);
        if parent.is_some() {
            self.parent = parent;
        }
        for (_, member) in &mut self.members {
            member.attach(self.policy, self.parent.clone());
        }
    }

    /// Returns true if any member has unsaved changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.members.iter().any(|(_, member)| member.has_changes())
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

    /// Saves every member with changes in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` for read-only collections and configuration
    /// errors.
    pub fn save_all(&mut self) -> CoreResult<bool> {
        self.save_all_with(SaveOptions::default())
    }

    /// Saves every member with changes in one transaction.
    ///
    /// # Errors
    ///
    /// See [`save_all`](Self::save_all).
    pub fn save_all_with(&mut self, options: SaveOptions) -> CoreResult<bool> {
        orchestrator::save_all(self, options)
    }

    /// Deletes every member in one transaction and empties the collection.
    ///
    /// Members that may not be deleted are skipped with a warning and stay.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` or `DeleteForbidden` if the collection may not be
    /// deleted, and configuration errors.
    pub fn delete_full(&mut self) -> CoreResult<bool> {
        orchestrator::delete_full(self)
    }

    /// Serializes the members in order.
    #[must_use]
    pub fn to_json(&self, full: bool) -> serde_json::Value {
        serde_json::Value::Array(
            self.members
                .iter()
                .map(|(_, member)| member.to_json(full))
                .collect(),
        )
    }

    fn took_part(&self, index: usize) -> bool {
        self.participants.get(index).copied().unwrap_or(false)
    }

    /// Replaces temporary keys of newly inserted members by their primary
    /// key.
    fn rekey(&mut self, was_new: &[bool]) {
        let mut keys: Vec<Value> = self.members.iter().map(|(key, _)| key.clone()).collect();
        for (index, (_, member)) in self.members.iter().enumerate() {
            if was_new.get(index).copied().unwrap_or(false) && !member.is_new() {
                let key = member.primary_key();
                if !key.is_null() {
                    keys[index] = key;
                }
            }
        }
        for index in 0..keys.len() {
            let current = &self.members[index].0;
            if keys[index] == *current {
                continue;
            }
            let taken = keys
                .iter()
                .enumerate()
                .any(|(other, key)| other != index && *key == keys[index]);
            if taken {
                tracing::warn!(
                    entity = self.member_type.name(),
                    key = %keys[index],
                    "generated key already used in collection, keeping temporary key"
                );
                keys[index] = current.clone();
                continue;
            }
            tracing::debug!(
                entity = self.member_type.name(),
                from = %current,
                to = %keys[index],
                "re-keyed member"
            );
        }
        for ((key, _), new_key) in self.members.iter_mut().zip(keys) {
            *key = new_key;
        }
    }
}

impl Persistable for CollectionNode {
    fn label(&self) -> &str {
        self.member_type.name()
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn resource(&self) -> &str {
        self.member_type.resource_name()
    }

    fn is_new(&self) -> bool {
        false
    }

    fn has_changes(&self) -> bool {
        CollectionNode::has_changes(self)
    }

    fn is_read_only(&self) -> bool {
        CollectionNode::is_read_only(self)
    }

    fn can_delete(&self) -> bool {
        CollectionNode::can_delete(self)
    }

    fn sink_mut(&mut self) -> &mut ActionErrorSink {
        &mut self.sink
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot::Collection(
            self.members
                .iter()
                .map(|(key, member)| (key.clone(), member.snapshot()))
                .collect(),
        )
    }

    fn restore(&mut self, snapshot: NodeSnapshot) {
        let NodeSnapshot::Collection(entries) = snapshot else {
            tracing::error!(entity = self.member_type.name(), "snapshot kind mismatch, not restored");
            return;
        };
        if entries.len() != self.members.len() {
            tracing::warn!(
                entity = self.member_type.name(),
                expected = entries.len(),
                actual = self.members.len(),
                "collection changed size since snapshot"
            );
        }
        for ((key, member), (saved_key, saved)) in self.members.iter_mut().zip(entries) {
            *key = saved_key;
            member.restore(saved);
        }
    }

    fn before_save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool> {
        self.sink.clear();
        self.own_snapshot = Some(
            self.members
                .iter()
                .map(|(key, member)| (key.clone(), member.snapshot()))
                .collect(),
        );
        self.participants = vec![false; self.members.len()];

        let mut prepared = true;
        for (index, (_, member)) in self.members.iter_mut().enumerate() {
            if !member.has_changes() || member.is_read_only() {
                continue;
            }
            self.participants[index] = true;
            let member_prepared = member.before_save_all_internal(options);
            self.sink.absorb(member.sink_mut());
            prepared &= member_prepared?;
        }
        Ok(prepared)
    }

    fn save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool> {
        let was_new: Vec<bool> = self.members.iter().map(|(_, m)| m.is_new()).collect();
        for (_, member) in &mut self.members {
            if member.has_changes() && !save_nested(&mut self.sink, member, options)? {
                return Ok(false);
            }
        }
        self.rekey(&was_new);
        Ok(true)
    }

    fn after_save_all_internal(&mut self, _had_changes: bool) {
        let participants = std::mem::take(&mut self.participants);
        for (index, (_, member)) in self.members.iter_mut().enumerate() {
            member.after_save_all_internal(participants.get(index).copied().unwrap_or(false));
        }
        self.own_snapshot = None;
    }

    fn after_save_all_failed_internal(&mut self) {
        for index in 0..self.members.len() {
            if self.took_part(index) {
                self.members[index].1.after_save_all_failed_internal();
            }
        }
        self.participants.clear();
        if let Some(entries) = self.own_snapshot.take() {
            self.restore(NodeSnapshot::Collection(entries));
        }
    }

    fn before_delete_full_internal(&mut self) -> CoreResult<bool> {
        self.sink.clear();
        self.own_snapshot = Some(
            self.members
                .iter()
                .map(|(key, member)| (key.clone(), member.snapshot()))
                .collect(),
        );
        self.participants = vec![false; self.members.len()];

        let mut prepared = true;
        for (index, (_, member)) in self.members.iter_mut().enumerate() {
            if !member.can_delete() {
                self.sink
                    .warn(ActionError::new(member.type_name(), "may not be deleted, skipped"));
                continue;
            }
            self.participants[index] = true;
            let member_prepared = member.before_delete_full_internal();
            self.sink.absorb(member.sink_mut());
            prepared &= member_prepared?;
        }
        Ok(prepared)
    }

    fn delete_full_internal(&mut self) -> CoreResult<bool> {
        for index in 0..self.members.len() {
            if !self.took_part(index) {
                continue;
            }
            if !delete_nested(&mut self.sink, &mut self.members[index].1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn after_delete_full_internal(&mut self) {
        let participants = std::mem::take(&mut self.participants);
        let members = std::mem::take(&mut self.members);
        for (index, (key, mut member)) in members.into_iter().enumerate() {
            if participants.get(index).copied().unwrap_or(false) {
                member.after_delete_full_internal();
            } else {
                self.members.push((key, member));
            }
        }
        self.own_snapshot = None;
    }

    fn after_delete_full_failed_internal(&mut self) {
        for index in 0..self.members.len() {
            if self.took_part(index) {
                self.members[index].1.after_delete_full_failed_internal();
            }
        }
        self.participants.clear();
        if let Some(entries) = self.own_snapshot.take() {
            self.restore(NodeSnapshot::Collection(entries));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::Config;
    use cascade_store::{ColumnSchema, MemoryConnection, Operation, ResourceRegistry, TableSchema};
    use cascade_value::DataType;

    fn session(config: Config) -> (Session, Arc<MemoryConnection>) {
        let conn = Arc::new(MemoryConnection::new());
        conn.create_table(
            TableSchema::new("tags")
                .column(ColumnSchema::id("id"))
                .column(ColumnSchema::new("label", DataType::Text).size(10)),
        );
        conn.create_table(TableSchema::new("notes").column(ColumnSchema::id("id")));
        let catalog = Catalog::new()
            .with_entity(EntityType::new("Tag", "tags"))
            .with_entity(EntityType::new("Note", "notes"));
        let registry = ResourceRegistry::new().with("default", conn.clone());
        (Session::builder(registry, catalog).config(config).build(), conn)
    }

    fn tag(session: &Session, label: &str) -> EntityNode {
        let mut tag = EntityNode::new(session, "Tag").unwrap();
        tag.set("label", label).unwrap();
        tag
    }

    #[test]
    fn push_assigns_increasing_keys() {
        let (session, _conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        assert_eq!(tags.push(tag(&session, "a")).unwrap(), Value::Integer(0));
        assert_eq!(tags.push(tag(&session, "b")).unwrap(), Value::Integer(1));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn rejects_other_member_types() {
        let (session, _conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        let note = EntityNode::new(&session, "Note").unwrap();
        assert!(matches!(tags.push(note), Err(CoreError::MemberType { .. })));
    }

    #[test]
    fn unknown_key_auto_creates_or_fails() {
        let (session, _conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        tags.get_mut("first").unwrap().set("label", "x").unwrap();
        assert!(tags.contains_key(&Value::from("first")));

        tags.set_auto_create(false);
        assert!(matches!(tags.get_mut("second"), Err(CoreError::MissingMember { .. })));
    }

    #[test]
    fn read_only_collection_rejects_mutation() {
        let (session, _conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        tags.push(tag(&session, "a")).unwrap();
        tags.set_read_only(Some(true));

        assert!(matches!(tags.push(tag(&session, "b")), Err(CoreError::ReadOnly { .. })));
        assert!(matches!(tags.remove(&Value::Integer(0)), Err(CoreError::ReadOnly { .. })));
        assert!(tags.get(&Value::Integer(0)).unwrap().is_read_only());
    }

    #[test]
    fn save_rekeys_new_members() {
        let (session, conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        tags.push(tag(&session, "a")).unwrap();
        tags.push(tag(&session, "b")).unwrap();

        assert!(tags.save_all().unwrap());
        let keys: Vec<Value> = tags.keys().cloned().collect();
        assert_eq!(keys, vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(conn.rows("tags").len(), 2);
        assert!(!tags.has_changes());
    }

    #[test]
    fn unchanged_members_are_not_written() {
        let (session, conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        tags.push(tag(&session, "a")).unwrap();
        tags.push(tag(&session, "b")).unwrap();
        tags.save_all().unwrap();

        let writes = conn.write_count();
        tags.get_mut(Value::Integer(2)).unwrap().set("label", "c").unwrap();
        assert!(tags.save_all().unwrap());
        assert_eq!(conn.write_count(), writes + 1);
    }

    #[test]
    fn failed_save_restores_every_member() {
        let (session, conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        tags.push(tag(&session, "a")).unwrap();
        tags.push(tag(&session, "b")).unwrap();
        conn.fail_after(Operation::Insert, Some("tags"), 1);

        assert!(!tags.save_all().unwrap());
        assert_eq!(tags.errors().len(), 1);
        let keys: Vec<Value> = tags.keys().cloned().collect();
        assert_eq!(keys, vec![Value::Integer(0), Value::Integer(1)]);
        assert!(tags.iter().all(|(_, t)| t.is_new() && t.is_dirty()));
        assert!(conn.rows("tags").is_empty());
    }

    #[test]
    fn validation_errors_block_the_save() {
        let (session, conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        tags.push(tag(&session, "far too long for ten")).unwrap();

        assert!(!tags.save_all().unwrap());
        assert_eq!(tags.errors()[0].field.as_deref(), Some("label"));
        assert_eq!(conn.write_count(), 0);
    }

    #[test]
    fn delete_empties_and_keeps_protected_members() {
        let (session, conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        tags.push(tag(&session, "a")).unwrap();
        tags.push(tag(&session, "b")).unwrap();
        tags.save_all().unwrap();

        tags.get_mut(Value::Integer(1)).unwrap().set_can_delete(Some(false));
        assert!(tags.delete_full().unwrap());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.warnings().len(), 1);
        assert_eq!(conn.rows("tags").len(), 1);
    }

    #[test]
    fn load_keys_by_primary_key() {
        let (session, _conn) = session(Config::default());
        let mut tags = CollectionNode::new(&session, "Tag").unwrap();
        tags.push(tag(&session, "a")).unwrap();
        tags.push(tag(&session, "b")).unwrap();
        tags.save_all().unwrap();

        let mut loaded = CollectionNode::new(&session, "Tag").unwrap();
        assert_eq!(loaded.load(&Filter::all().eq("label", "b")).unwrap(), 1);
        assert!(loaded.contains_key(&Value::Integer(2)));
        assert!(!loaded.has_changes());
    }
}
