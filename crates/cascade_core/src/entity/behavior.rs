//! Per-type validation and lifecycle hooks.

use super::EntityNode;
use std::collections::BTreeMap;

/// Field name to validation messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Custom behaviour attached to an entity type.
///
/// All methods have no-op defaults. Validation runs inside the before phase
/// of a save, so a non-empty result blocks the save before any row is
/// written. The after hooks run once the outcome of the whole cascade is
/// known.
pub trait EntityBehavior: Send + Sync {
    /// Returns field errors for `entity`.
    fn validate(&self, entity: &EntityNode) -> FieldErrors {
        let _ = entity;
        FieldErrors::new()
    }

    /// Called after the cascade committed. `had_changes` is false for nodes
    /// that were part of the graph but had nothing to write.
    fn after_save_all(&self, entity: &EntityNode, had_changes: bool) {
        let _ = (entity, had_changes);
    }

    /// Called after a failed save, once `entity` has been restored.
    fn after_save_all_failed(&self, entity: &EntityNode) {
        let _ = entity;
    }

    /// Called after a committed delete.
    fn after_delete_full(&self, entity: &EntityNode) {
        let _ = entity;
    }
}

/// Behaviour with no validation and no hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBehavior;

impl EntityBehavior for DefaultBehavior {}
