//! Small value objects every node carries.
//!
//! - [`MutabilityPolicy`]: tri-state read-only and can-delete flags
//! - [`ParentLink`]: which parent relation a node hangs off
//! - [`ActionErrorSink`]: errors and warnings collected by an operation

use crate::config::Config;
use cascade_store::StoreError;
use serde::Serialize;
use std::fmt;

/// Read-only and can-delete flags. `None` defers to the session config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutabilityPolicy {
    read_only: Option<bool>,
    can_delete: Option<bool>,
}

impl MutabilityPolicy {
    /// Returns the explicit read-only flag.
    #[must_use]
    pub fn read_only(&self) -> Option<bool> {
        self.read_only
    }

    /// Returns the explicit can-delete flag.
    #[must_use]
    pub fn can_delete_flag(&self) -> Option<bool> {
        self.can_delete
    }

    /// Sets or clears the read-only flag.
    pub fn set_read_only(&mut self, value: Option<bool>) {
        self.read_only = value;
    }

    /// Sets or clears the can-delete flag.
    pub fn set_can_delete(&mut self, value: Option<bool>) {
        self.can_delete = value;
    }

    /// Resolves the read-only flag.
    #[must_use]
    pub fn is_read_only(&self, config: &Config) -> bool {
        self.read_only.unwrap_or(config.default_read_only)
    }

    /// Resolves the can-delete flag. Read-only nodes can never be deleted.
    #[must_use]
    pub fn can_delete(&self, config: &Config) -> bool {
        !self.is_read_only(config) && self.can_delete.unwrap_or(config.default_can_delete)
    }

    /// Returns this policy with every flag `other` sets taking precedence.
    #[must_use]
    pub fn overlay(self, other: MutabilityPolicy) -> Self {
        Self {
            read_only: other.read_only.or(self.read_only),
            can_delete: other.can_delete.or(self.can_delete),
        }
    }
}

/// The relation through which a node is reached from its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    /// Parent entity type.
    pub parent_type: String,
    /// Relation name on the parent.
    pub relation: String,
    /// Columns on this node that the parent fills during its save.
    pub filled_columns: Vec<String>,
}

impl ParentLink {
    /// Returns true if the parent fills `column`.
    #[must_use]
    pub fn fills(&self, column: &str) -> bool {
        self.filled_columns.iter().any(|c| c == column)
    }
}

/// One error or warning produced while saving or deleting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionError {
    /// Human readable message.
    pub message: String,
    /// The field the message refers to.
    pub field: Option<String>,
    /// The entity type or attribute set that produced it.
    pub source: String,
    /// Store error code, for store failures.
    pub code: Option<String>,
}

impl ActionError {
    /// Creates an error not tied to a field.
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            source: source.into(),
            code: None,
        }
    }

    /// Creates an error for one field.
    pub fn field(
        source: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(source, message)
        }
    }

    /// Converts a store failure.
    pub fn store(source: impl Into<String>, err: &StoreError) -> Self {
        Self {
            code: Some(err.code().to_string()),
            ..Self::new(source, err.to_string())
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}: {}", self.source, field, self.message),
            None => write!(f, "{}: {}", self.source, self.message),
        }
    }
}

/// Errors and warnings collected by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionErrorSink {
    errors: Vec<ActionError>,
    warnings: Vec<ActionError>,
}

impl ActionErrorSink {
    /// Records an error.
    pub fn error(&mut self, error: ActionError) {
        tracing::debug!(%error, "action error");
        self.errors.push(error);
    }

    /// Records a warning.
    pub fn warn(&mut self, warning: ActionError) {
        tracing::warn!(%warning, "action warning");
        self.warnings.push(warning);
    }

    /// Returns the recorded errors.
    #[must_use]
    pub fn errors(&self) -> &[ActionError] {
        &self.errors
    }

    /// Returns the recorded warnings.
    #[must_use]
    pub fn warnings(&self) -> &[ActionError] {
        &self.warnings
    }

    /// Returns true if any error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }

    /// Moves another sink's entries into this one.
    pub fn absorb(&mut self, other: &mut ActionErrorSink) {
        self.errors.append(&mut other.errors);
        self.warnings.append(&mut other.warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defers_to_config() {
        let config = Config::default();
        let policy = MutabilityPolicy::default();
        assert!(!policy.is_read_only(&config));
        assert!(policy.can_delete(&config));

        let strict = Config::default().default_read_only(true);
        assert!(policy.is_read_only(&strict));
        assert!(!policy.can_delete(&strict));
    }

    #[test]
    fn overlay_prefers_explicit_flags() {
        let mut base = MutabilityPolicy::default();
        base.set_read_only(Some(false));
        base.set_can_delete(Some(true));

        let mut over = MutabilityPolicy::default();
        over.set_can_delete(Some(false));

        let merged = base.overlay(over);
        assert_eq!(merged.read_only(), Some(false));
        assert_eq!(merged.can_delete_flag(), Some(false));
    }

    #[test]
    fn sink_absorbs_children() {
        let mut child = ActionErrorSink::default();
        child.error(ActionError::field("Line", "qty", "required"));
        child.warn(ActionError::new("Note", "read-only, skipped"));

        let mut root = ActionErrorSink::default();
        root.absorb(&mut child);
        assert!(root.has_errors());
        assert!(!child.has_errors());
        assert_eq!(root.warnings().len(), 1);
        assert_eq!(root.errors()[0].to_string(), "Line.qty: required");

        root.clear();
        assert!(!root.has_errors());
    }

    #[test]
    fn store_errors_keep_code() {
        let err = ActionError::store("Order", &StoreError::constraint("duplicate"));
        assert_eq!(err.code.as_deref(), Some("23000"));
    }

    #[test]
    fn parent_link_fills() {
        let link = ParentLink {
            parent_type: "Order".into(),
            relation: "lines".into(),
            filled_columns: vec!["order_id".into()],
        };
        assert!(link.fills("order_id"));
        assert!(!link.fills("qty"));
    }
}
