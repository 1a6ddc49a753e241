//! Relation declarations.

use super::link::LinkType;
use crate::policy::MutabilityPolicy;

/// Cardinality of a relation as seen from the declaring type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// One related entity that references the declaring entity.
    HasOne,
    /// A collection of entities that reference the declaring entity.
    HasMany,
    /// One related entity the declaring entity references.
    BelongsTo,
    /// An attribute set keyed by the declaring entity.
    Attributes,
}

/// What a relation points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationTarget {
    /// A single entity of the named type.
    Entity(String),
    /// A collection of entities of the named type.
    Collection(String),
    /// The named attribute set.
    Attributes(String),
}

impl RelationTarget {
    /// Returns the target type or attribute set name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            RelationTarget::Entity(name)
            | RelationTarget::Collection(name)
            | RelationTarget::Attributes(name) => name,
        }
    }
}

/// A pair of joined columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkColumn {
    /// Column on the declaring entity.
    pub local: String,
    /// Column on the related entity.
    pub remote: String,
}

/// Normalized configuration of one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDescriptor {
    name: String,
    kind: RelationKind,
    target: RelationTarget,
    link: Vec<LinkColumn>,
    cascade_save: bool,
    cascade_delete: bool,
    link_type: LinkType,
    policy: MutabilityPolicy,
    serialize: bool,
}

impl RelationDescriptor {
    fn new(name: impl Into<String>, kind: RelationKind, target: RelationTarget) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
            link: Vec::new(),
            cascade_save: false,
            cascade_delete: false,
            link_type: LinkType::NONE,
            policy: MutabilityPolicy::default(),
            serialize: true,
        }
    }

    /// Declares a single related entity.
    pub fn has_one(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasOne, RelationTarget::Entity(entity.into()))
    }

    /// Declares a collection of related entities.
    pub fn has_many(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasMany, RelationTarget::Collection(entity.into()))
    }

    /// Declares a referenced entity. Never cascades.
    pub fn belongs_to(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, RelationKind::BelongsTo, RelationTarget::Entity(entity.into()))
    }

    /// Declares an attribute set keyed by this entity.
    ///
    /// Attribute relations cascade in both directions and take their object
    /// id from the primary key unless a link column says otherwise.
    pub fn attributes(name: impl Into<String>, set: impl Into<String>) -> Self {
        let mut relation = Self::new(
            name,
            RelationKind::Attributes,
            RelationTarget::Attributes(set.into()),
        );
        relation.cascade_save = true;
        relation.cascade_delete = true;
        relation.link_type = LinkType::FROM_PARENT_MAINT;
        relation
    }

    /// Joins `local` on this entity to `remote` on the related one.
    #[must_use]
    pub fn link(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.link.push(LinkColumn {
            local: local.into(),
            remote: remote.into(),
        });
        self
    }

    /// Cascades both save and delete.
    #[must_use]
    pub fn cascade(self) -> Self {
        self.cascade_save(true).cascade_delete(true)
    }

    /// Sets cascade-on-save.
    #[must_use]
    pub fn cascade_save(mut self, value: bool) -> Self {
        self.cascade_save = value;
        self
    }

    /// Sets cascade-on-delete.
    #[must_use]
    pub fn cascade_delete(mut self, value: bool) -> Self {
        self.cascade_delete = value;
        self
    }

    /// Sets the link policy.
    #[must_use]
    pub fn link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = link_type;
        self
    }

    /// Forces the related nodes read-only (or writable).
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.policy.set_read_only(Some(value));
        self
    }

    /// Allows or forbids deleting the related nodes.
    #[must_use]
    pub fn can_delete(mut self, value: bool) -> Self {
        self.policy.set_can_delete(Some(value));
        self
    }

    /// Includes or excludes the relation from full serialization.
    #[must_use]
    pub fn serialize(mut self, value: bool) -> Self {
        self.serialize = value;
        self
    }

    /// Applies the rules every declared relation must obey.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.kind == RelationKind::BelongsTo && (self.cascade_save || self.cascade_delete) {
            tracing::warn!(relation = %self.name, "belongs-to relation cannot cascade, disabled");
            self.cascade_save = false;
            self.cascade_delete = false;
        }
        self
    }

    /// Returns the relation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the relation kind.
    #[must_use]
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Returns the relation target.
    #[must_use]
    pub fn target(&self) -> &RelationTarget {
        &self.target
    }

    /// Returns the joined column pairs.
    #[must_use]
    pub fn link_columns(&self) -> &[LinkColumn] {
        &self.link
    }

    /// Returns true if saves cascade into the relation.
    #[must_use]
    pub fn cascades_save(&self) -> bool {
        self.cascade_save
    }

    /// Returns true if deletes cascade into the relation.
    #[must_use]
    pub fn cascades_delete(&self) -> bool {
        self.cascade_delete
    }

    /// Returns the link policy.
    #[must_use]
    pub fn link_kind(&self) -> LinkType {
        self.link_type
    }

    /// Returns the overrides applied to related nodes.
    #[must_use]
    pub fn policy(&self) -> MutabilityPolicy {
        self.policy
    }

    /// Returns true if full serialization includes the relation.
    #[must_use]
    pub fn serializes(&self) -> bool {
        self.serialize
    }
}
