//! Registry of entity types and attribute sets.

use crate::attribute::AttributeSetDef;
use crate::entity::EntityType;
use crate::error::{CoreError, CoreResult};
use crate::relation::RelationTarget;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every entity type and attribute set a session knows about.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: BTreeMap<String, Arc<EntityType>>,
    attribute_sets: BTreeMap<String, Arc<AttributeSetDef>>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) an entity type.
    pub fn register_entity(&mut self, entity_type: EntityType) {
        self.entities
            .insert(entity_type.name().to_string(), Arc::new(entity_type));
    }

    /// Builder form of [`register_entity`](Self::register_entity).
    #[must_use]
    pub fn with_entity(mut self, entity_type: EntityType) -> Self {
        self.register_entity(entity_type);
        self
    }

    /// Registers (or replaces) an attribute set.
    pub fn register_attributes(&mut self, set: AttributeSetDef) {
        self.attribute_sets
            .insert(set.name().to_string(), Arc::new(set));
    }

    /// Builder form of [`register_attributes`](Self::register_attributes).
    #[must_use]
    pub fn with_attributes(mut self, set: AttributeSetDef) -> Self {
        self.register_attributes(set);
        self
    }

    /// Looks up an entity type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if nothing is registered under `name`.
    pub fn entity(&self, name: &str) -> CoreResult<Arc<EntityType>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_type(name))
    }

    /// Looks up an attribute set.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if nothing is registered under `name`.
    pub fn attribute_set(&self, name: &str) -> CoreResult<Arc<AttributeSetDef>> {
        self.attribute_sets
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_type(name))
    }

    /// Returns the registered entity type names.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Checks that every relation target resolves.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` for the first relation whose target is missing.
    pub fn check(&self) -> CoreResult<()> {
        for entity in self.entities.values() {
            for relation in entity.relations() {
                match relation.target() {
                    RelationTarget::Entity(name) | RelationTarget::Collection(name) => {
                        self.entity(name)?;
                    }
                    RelationTarget::Attributes(name) => {
                        self.attribute_set(name)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::RelationDescriptor;

    #[test]
    fn lookup() {
        let catalog = Catalog::new()
            .with_entity(EntityType::new("Order", "orders"))
            .with_attributes(AttributeSetDef::new("order_attrs").entity_type_id(1));

        assert_eq!(catalog.entity("Order").unwrap().table(), "orders");
        assert!(catalog.attribute_set("order_attrs").is_ok());
        assert!(matches!(
            catalog.entity("Nope"),
            Err(CoreError::UnknownType { .. })
        ));
    }

    #[test]
    fn check_reports_unresolvable_targets() {
        let catalog = Catalog::new().with_entity(
            EntityType::new("Order", "orders")
                .relation(RelationDescriptor::has_many("lines", "Line")),
        );
        assert!(catalog.check().is_err());

        let catalog = catalog.with_entity(EntityType::new("Line", "lines"));
        assert!(catalog.check().is_ok());
    }
}
