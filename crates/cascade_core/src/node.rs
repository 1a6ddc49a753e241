//! The protocol shared by every persistable node.
//!
//! Entities, collections and attribute stores all take part in a cascade
//! the same way: a before phase that validates and snapshots, a save (or
//! delete) phase, then either the success or the failure after phase.
//! [`RelatedNode`] is what an entity holds for each populated relation.

use crate::attribute::{AttributeSnapshot, AttributeStore};
use crate::collection::CollectionNode;
use crate::entity::EntityNode;
use crate::error::CoreResult;
use crate::policy::{ActionError, ActionErrorSink, MutabilityPolicy, ParentLink};
use crate::session::Session;
use crate::tracker::TrackerSnapshot;
use cascade_value::Value;
use std::collections::BTreeMap;

/// Options of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Validate dirty nodes before writing.
    pub run_validation: bool,
    /// Save populated relations even when they do not cascade.
    pub push: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            run_validation: true,
            push: false,
        }
    }
}

impl SaveOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether validation runs.
    #[must_use]
    pub const fn run_validation(mut self, value: bool) -> Self {
        self.run_validation = value;
        self
    }

    /// Sets whether non-cascading relations are saved too.
    #[must_use]
    pub const fn push(mut self, value: bool) -> Self {
        self.push = value;
        self
    }
}

/// Captured state of an entity and everything below it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    /// The entity's own fields.
    pub tracker: TrackerSnapshot,
    /// Snapshots of the populated relations.
    pub relations: BTreeMap<String, NodeSnapshot>,
}

/// Captured state of any node, recursively.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSnapshot {
    /// An entity.
    Entity(Box<EntitySnapshot>),
    /// A collection: member keys and member snapshots in order.
    Collection(Vec<(Value, NodeSnapshot)>),
    /// An attribute store.
    Attributes(Box<AttributeSnapshot>),
}

/// What a parent remembers about one relation during an operation.
#[derive(Debug, Clone)]
pub(crate) struct ChildChangeRecord {
    /// Whether the child took part in the operation.
    pub has_changes: bool,
    /// The child's state before the operation.
    pub snapshot: NodeSnapshot,
}

/// Phases of the save and delete protocol.
///
/// Top-level calls go through the orchestrator, which owns the
/// transaction; nested calls come from a parent and never touch it.
pub(crate) trait Persistable {
    fn label(&self) -> &str;
    fn session(&self) -> &Session;
    fn resource(&self) -> &str;
    fn is_new(&self) -> bool;
    fn has_changes(&self) -> bool;
    fn is_read_only(&self) -> bool;
    fn can_delete(&self) -> bool;
    fn sink_mut(&mut self) -> &mut ActionErrorSink;
    fn snapshot(&self) -> NodeSnapshot;
    fn restore(&mut self, snapshot: NodeSnapshot);

    fn before_save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool>;
    fn save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool>;
    fn after_save_all_internal(&mut self, had_changes: bool);
    fn after_save_all_failed_internal(&mut self);

    fn before_delete_full_internal(&mut self) -> CoreResult<bool>;
    fn delete_full_internal(&mut self) -> CoreResult<bool>;
    fn after_delete_full_internal(&mut self);
    fn after_delete_full_failed_internal(&mut self);
}

/// Saves `child` on behalf of a parent.
///
/// A read-only child is skipped with a warning. Everything the child
/// reports moves into the parent's sink.
pub(crate) fn save_nested<N: Persistable + ?Sized>(
    sink: &mut ActionErrorSink,
    child: &mut N,
    options: SaveOptions,
) -> CoreResult<bool> {
    if child.is_read_only() {
        sink.warn(ActionError::new(child.label(), "read-only, not saved"));
        return Ok(true);
    }
    let saved = child.save_all_internal(options);
    sink.absorb(child.sink_mut());
    saved
}

/// Deletes `child` on behalf of a parent.
pub(crate) fn delete_nested<N: Persistable + ?Sized>(
    sink: &mut ActionErrorSink,
    child: &mut N,
) -> CoreResult<bool> {
    let deleted = child.delete_full_internal();
    sink.absorb(child.sink_mut());
    deleted
}

/// A populated relation.
#[derive(Debug, Clone)]
pub enum RelatedNode {
    /// A single entity.
    Entity(Box<EntityNode>),
    /// A collection of entities.
    Collection(CollectionNode),
    /// An attribute store.
    Attributes(AttributeStore),
}

impl RelatedNode {
    /// Returns true if the node or anything below it has unsaved changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        Persistable::has_changes(self)
    }

    /// Returns the entity, if this is one.
    #[must_use]
    pub fn as_entity(&self) -> Option<&EntityNode> {
        match self {
            RelatedNode::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Returns the entity mutably, if this is one.
    pub fn as_entity_mut(&mut self) -> Option<&mut EntityNode> {
        match self {
            RelatedNode::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Returns the collection, if this is one.
    #[must_use]
    pub fn as_collection(&self) -> Option<&CollectionNode> {
        match self {
            RelatedNode::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Returns the collection mutably, if this is one.
    pub fn as_collection_mut(&mut self) -> Option<&mut CollectionNode> {
        match self {
            RelatedNode::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Returns the attribute store, if this is one.
    #[must_use]
    pub fn as_attributes(&self) -> Option<&AttributeStore> {
        match self {
            RelatedNode::Attributes(store) => Some(store),
            _ => None,
        }
    }

    /// Returns the attribute store mutably, if this is one.
    pub fn as_attributes_mut(&mut self) -> Option<&mut AttributeStore> {
        match self {
            RelatedNode::Attributes(store) => Some(store),
            _ => None,
        }
    }

    /// Short description used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            RelatedNode::Entity(_) => "entity",
            RelatedNode::Collection(_) => "collection",
            RelatedNode::Attributes(_) => "attributes",
        }
    }

    /// Serializes the node.
    #[must_use]
    pub fn to_json(&self, full: bool) -> serde_json::Value {
        match self {
            RelatedNode::Entity(entity) => entity.to_json(full),
            RelatedNode::Collection(collection) => collection.to_json(full),
            RelatedNode::Attributes(store) => store.to_json(),
        }
    }

    /// Applies a parent relation's overrides and link.
    pub(crate) fn attach(&mut self, policy: MutabilityPolicy, parent: Option<ParentLink>) {
        match self {
            RelatedNode::Entity(entity) => entity.attach(policy, parent),
            RelatedNode::Collection(collection) => collection.attach(policy, parent),
            RelatedNode::Attributes(store) => store.attach(policy),
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $node:ident => $body:expr) => {
        match $self {
            RelatedNode::Entity($node) => {
                let $node: &mut EntityNode = $node;
                $body
            }
            RelatedNode::Collection($node) => $body,
            RelatedNode::Attributes($node) => $body,
        }
    };
}

macro_rules! dispatch_ref {
    ($self:expr, $node:ident => $body:expr) => {
        match $self {
            RelatedNode::Entity($node) => {
                let $node: &EntityNode = $node;
                $body
            }
            RelatedNode::Collection($node) => $body,
            RelatedNode::Attributes($node) => $body,
        }
    };
}

impl Persistable for RelatedNode {
    fn label(&self) -> &str {
        dispatch_ref!(self, n => Persistable::label(n))
    }

    fn session(&self) -> &Session {
        dispatch_ref!(self, n => Persistable::session(n))
    }

    fn resource(&self) -> &str {
        dispatch_ref!(self, n => Persistable::resource(n))
    }

    fn is_new(&self) -> bool {
        dispatch_ref!(self, n => Persistable::is_new(n))
    }

    fn has_changes(&self) -> bool {
        dispatch_ref!(self, n => Persistable::has_changes(n))
    }

    fn is_read_only(&self) -> bool {
        dispatch_ref!(self, n => Persistable::is_read_only(n))
    }

    fn can_delete(&self) -> bool {
        dispatch_ref!(self, n => Persistable::can_delete(n))
    }

    fn sink_mut(&mut self) -> &mut ActionErrorSink {
        dispatch!(self, n => Persistable::sink_mut(n))
    }

    fn snapshot(&self) -> NodeSnapshot {
        dispatch_ref!(self, n => Persistable::snapshot(n))
    }

    fn restore(&mut self, snapshot: NodeSnapshot) {
        dispatch!(self, n => Persistable::restore(n, snapshot))
    }

    fn before_save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool> {
        dispatch!(self, n => n.before_save_all_internal(options))
    }

    fn save_all_internal(&mut self, options: SaveOptions) -> CoreResult<bool> {
        dispatch!(self, n => n.save_all_internal(options))
    }

    fn after_save_all_internal(&mut self, had_changes: bool) {
        dispatch!(self, n => n.after_save_all_internal(had_changes))
    }

    fn after_save_all_failed_internal(&mut self) {
        dispatch!(self, n => n.after_save_all_failed_internal())
    }

    fn before_delete_full_internal(&mut self) -> CoreResult<bool> {
        dispatch!(self, n => n.before_delete_full_internal())
    }

    fn delete_full_internal(&mut self) -> CoreResult<bool> {
        dispatch!(self, n => n.delete_full_internal())
    }

    fn after_delete_full_internal(&mut self) {
        dispatch!(self, n => n.after_delete_full_internal())
    }

    fn after_delete_full_failed_internal(&mut self) {
        dispatch!(self, n => n.after_delete_full_failed_internal())
    }
}
