//! Error types for Cascade core.
//!
//! [`CoreError`] is reserved for hard failures: policy violations on a
//! top-level call and configuration mistakes. Runtime data conditions such as
//! failed validation or a store error in the middle of a cascade are reported
//! as [`ActionError`](crate::ActionError)s and an `Ok(false)` result instead.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Cascade core operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Store error outside a save or delete cascade.
    #[error("store error: {0}")]
    Store(#[from] cascade_store::StoreError),

    /// Value conversion error.
    #[error("value error: {0}")]
    Value(#[from] cascade_value::ValueError),

    /// A read-only node was asked to change.
    #[error("{entity} is read-only")]
    ReadOnly {
        /// The entity type or collection label.
        entity: String,
    },

    /// A node that may not be deleted was asked to delete itself.
    #[error("{entity} may not be deleted")]
    DeleteForbidden {
        /// The entity type or collection label.
        entity: String,
    },

    /// A new record without any values was saved at top level.
    #[error("refusing to save an empty new {entity}")]
    EmptyNewRecord {
        /// The entity type.
        entity: String,
    },

    /// The field is not a column or attribute of the type.
    #[error("unknown field {field} on {entity}")]
    UnknownField {
        /// The entity type or attribute set.
        entity: String,
        /// The requested field.
        field: String,
    },

    /// The relation is not declared on the type.
    #[error("unknown relation {relation} on {entity}")]
    UnknownRelation {
        /// The entity type.
        entity: String,
        /// The requested relation.
        relation: String,
    },

    /// No entity type or attribute set is registered under the name.
    #[error("unknown type: {name}")]
    UnknownType {
        /// The requested type name.
        name: String,
    },

    /// The value attached to a relation does not fit its declared target.
    #[error("relation {relation} expects {expected}, got {actual}")]
    RelationTarget {
        /// The relation name.
        relation: String,
        /// The declared target.
        expected: String,
        /// What was supplied.
        actual: String,
    },

    /// An attribute set has no entity-type id.
    #[error("attribute set {set} has no entity type id")]
    MissingEntityTypeId {
        /// The attribute set name.
        set: String,
    },

    /// An attribute store was saved before it knew its object id.
    #[error("attribute set {set} has no object id")]
    MissingObjectId {
        /// The attribute set name.
        set: String,
    },

    /// A collection member has the wrong entity type.
    #[error("collection of {expected} cannot hold {actual}")]
    MemberType {
        /// The declared member type.
        expected: String,
        /// The supplied member type.
        actual: String,
    },

    /// A collection key was missing and auto-create is off.
    #[error("no member with key {key} in collection of {entity}")]
    MissingMember {
        /// The member type.
        entity: String,
        /// The requested key.
        key: String,
    },

    /// A stored row does not match the declared layout.
    #[error("invalid row in {table}: {message}")]
    InvalidRow {
        /// The table the row came from.
        table: String,
        /// What is wrong with it.
        message: String,
    },
}

impl CoreError {
    /// Creates a read-only error.
    pub fn read_only(entity: impl Into<String>) -> Self {
        Self::ReadOnly {
            entity: entity.into(),
        }
    }

    /// Creates a delete-forbidden error.
    pub fn delete_forbidden(entity: impl Into<String>) -> Self {
        Self::DeleteForbidden {
            entity: entity.into(),
        }
    }

    /// Creates an empty-new-record error.
    pub fn empty_new_record(entity: impl Into<String>) -> Self {
        Self::EmptyNewRecord {
            entity: entity.into(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Creates an unknown relation error.
    pub fn unknown_relation(entity: impl Into<String>, relation: impl Into<String>) -> Self {
        Self::UnknownRelation {
            entity: entity.into(),
            relation: relation.into(),
        }
    }

    /// Creates an unknown type error.
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates a relation target mismatch error.
    pub fn relation_target(
        relation: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::RelationTarget {
            relation: relation.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a missing entity-type id error.
    pub fn missing_entity_type_id(set: impl Into<String>) -> Self {
        Self::MissingEntityTypeId { set: set.into() }
    }

    /// Creates a missing object id error.
    pub fn missing_object_id(set: impl Into<String>) -> Self {
        Self::MissingObjectId { set: set.into() }
    }

    /// Creates a member type mismatch error.
    pub fn member_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::MemberType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a missing collection member error.
    pub fn missing_member(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingMember {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Creates an invalid row error.
    pub fn invalid_row(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRow {
            table: table.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_store::StoreError;

    #[test]
    fn display() {
        assert_eq!(
            CoreError::unknown_field("Order", "colour").to_string(),
            "unknown field colour on Order"
        );
        assert_eq!(
            CoreError::empty_new_record("Order").to_string(),
            "refusing to save an empty new Order"
        );
    }

    #[test]
    fn wraps_store_errors() {
        let err: CoreError = StoreError::table_not_found("orders").into();
        assert!(matches!(err, CoreError::Store(StoreError::TableNotFound { .. })));
    }
}
