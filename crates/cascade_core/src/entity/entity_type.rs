//! Entity type declarations.

use super::behavior::{DefaultBehavior, EntityBehavior};
use crate::policy::MutabilityPolicy;
use crate::relation::RelationDescriptor;
use std::fmt;
use std::sync::Arc;

/// Resource name used when a type does not name one.
pub const DEFAULT_RESOURCE: &str = "default";

/// Static description of one entity type.
///
/// # Example
///
/// ```rust
/// use cascade_core::{EntityType, LinkType, RelationDescriptor};
///
/// let order = EntityType::new("Order", "orders").relation(
///     RelationDescriptor::has_many("lines", "Line")
///         .link("id", "order_id")
///         .cascade()
///         .link_type(LinkType::FROM_PARENT_MAINT),
/// );
/// assert_eq!(order.primary_key(), "id");
/// assert!(order.relation_named("lines").is_some());
/// ```
#[derive(Clone)]
pub struct EntityType {
    name: String,
    table: String,
    resource: String,
    primary_key: String,
    relations: Vec<RelationDescriptor>,
    behavior: Arc<dyn EntityBehavior>,
    policy: MutabilityPolicy,
}

impl EntityType {
    /// Declares a type stored in `table` of the default resource.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            resource: DEFAULT_RESOURCE.to_string(),
            primary_key: "id".to_string(),
            relations: Vec::new(),
            behavior: Arc::new(DefaultBehavior),
            policy: MutabilityPolicy::default(),
        }
    }

    /// Sets the resource the table lives in.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Sets the primary key column.
    #[must_use]
    pub fn primary_key_column(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Adds a relation, normalizing it. A relation with the same name is
    /// replaced.
    #[must_use]
    pub fn relation(mut self, relation: RelationDescriptor) -> Self {
        let relation = relation.normalize();
        self.relations.retain(|r| r.name() != relation.name());
        self.relations.push(relation);
        self
    }

    /// Attaches validation and lifecycle hooks.
    #[must_use]
    pub fn behavior(mut self, behavior: impl EntityBehavior + 'static) -> Self {
        self.behavior = Arc::new(behavior);
        self
    }

    /// Makes every instance read-only unless overridden.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.policy.set_read_only(Some(value));
        self
    }

    /// Allows or forbids deleting instances unless overridden.
    #[must_use]
    pub fn can_delete(mut self, value: bool) -> Self {
        self.policy.set_can_delete(Some(value));
        self
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the resource name.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource
    }

    /// Returns the primary key column.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Returns the relations in declaration order.
    #[must_use]
    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    /// Looks up a relation by name.
    #[must_use]
    pub fn relation_named(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name() == name)
    }

    /// Returns the hooks.
    #[must_use]
    pub fn hooks(&self) -> Arc<dyn EntityBehavior> {
        Arc::clone(&self.behavior)
    }

    /// Returns the type-level policy.
    #[must_use]
    pub fn policy(&self) -> MutabilityPolicy {
        self.policy
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("resource", &self.resource)
            .field("primary_key", &self.primary_key)
            .field("relations", &self.relations)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
