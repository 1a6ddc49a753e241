//! Per-node change tracking.

use cascade_value::Value;
use std::collections::BTreeMap;

/// Original and current field values of one node.
///
/// The dirty map holds, for every changed field, the value it had when the
/// node was loaded or last saved. Changing a dirty field again keeps that
/// original; setting it back to the original removes it from the map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeTracker {
    values: BTreeMap<String, Value>,
    dirty: BTreeMap<String, Value>,
    is_new: bool,
}

/// Everything needed to put a [`ChangeTracker`] back where it was.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    /// The new flag.
    pub is_new: bool,
    /// Field to original value for every dirty field.
    pub dirty: BTreeMap<String, Value>,
    /// Current values.
    pub values: BTreeMap<String, Value>,
}

impl ChangeTracker {
    /// Creates a tracker for a record that has not been stored yet.
    #[must_use]
    pub fn new_record() -> Self {
        Self {
            is_new: true,
            ..Self::default()
        }
    }

    /// Creates a clean tracker for a stored record.
    #[must_use]
    pub fn loaded(values: BTreeMap<String, Value>) -> Self {
        Self {
            values,
            dirty: BTreeMap::new(),
            is_new: false,
        }
    }

    /// Returns true if the record has not been stored yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Sets the new flag.
    pub fn set_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    /// Returns the current value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Returns the current value of a field, null when absent.
    #[must_use]
    pub fn value(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Returns all current values.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Sets a value without marking it dirty.
    ///
    /// Used for loaded values, schema defaults and store-generated keys.
    pub fn load_value(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        self.dirty.remove(&field);
        self.values.insert(field, value);
    }

    /// Records a change to `field`. Returns true if anything changed.
    pub fn record_change(&mut self, field: &str, value: Value) -> bool {
        let current = self.value(field);
        match self.dirty.get(field) {
            Some(original) if *original == value => {
                let original = original.clone();
                self.dirty.remove(field);
                self.values.insert(field.to_string(), original);
                true
            }
            Some(_) if current != value => {
                self.values.insert(field.to_string(), value);
                true
            }
            None if current != value => {
                self.dirty.insert(field.to_string(), current);
                self.values.insert(field.to_string(), value);
                true
            }
            _ => false,
        }
    }

    /// Returns true if any field differs from its original.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Returns true if `field` differs from its original.
    #[must_use]
    pub fn is_field_dirty(&self, field: &str) -> bool {
        self.dirty.contains_key(field)
    }

    /// Returns field to original value for every dirty field.
    #[must_use]
    pub fn dirty_fields(&self) -> &BTreeMap<String, Value> {
        &self.dirty
    }

    /// Returns the original value of a field, the current one if clean.
    #[must_use]
    pub fn original(&self, field: &str) -> Value {
        match self.dirty.get(field) {
            Some(original) => original.clone(),
            None => self.value(field),
        }
    }

    /// Returns field to current value for every dirty field.
    #[must_use]
    pub fn changed_values(&self) -> BTreeMap<String, Value> {
        self.dirty
            .keys()
            .map(|field| (field.clone(), self.value(field)))
            .collect()
    }

    /// Accepts the current values as stored.
    pub fn mark_saved(&mut self) {
        self.dirty.clear();
        self.is_new = false;
    }

    /// Captures the full tracker state.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            is_new: self.is_new,
            dirty: self.dirty.clone(),
            values: self.values.clone(),
        }
    }

    /// Reinstates a captured state, values and dirty map alike.
    pub fn restore(&mut self, snapshot: TrackerSnapshot) {
        self.is_new = snapshot.is_new;
        self.dirty = snapshot.dirty;
        self.values = snapshot.values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn loaded(pairs: &[(&str, i64)]) -> ChangeTracker {
        ChangeTracker::loaded(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), Value::Integer(*v)))
                .collect(),
        )
    }

    #[test]
    fn first_change_records_original() {
        let mut t = loaded(&[("qty", 1)]);
        assert!(t.record_change("qty", Value::Integer(2)));
        assert_eq!(t.dirty_fields().get("qty"), Some(&Value::Integer(1)));
        assert_eq!(t.get("qty"), Some(&Value::Integer(2)));
    }

    #[test]
    fn second_change_keeps_first_original() {
        let mut t = loaded(&[("qty", 1)]);
        t.record_change("qty", Value::Integer(2));
        t.record_change("qty", Value::Integer(3));
        assert_eq!(t.dirty_fields().get("qty"), Some(&Value::Integer(1)));
        assert_eq!(t.get("qty"), Some(&Value::Integer(3)));
    }

    #[test]
    fn revert_clears_dirty() {
        let mut t = loaded(&[("qty", 1), ("price", 5)]);
        t.record_change("qty", Value::Integer(2));
        t.record_change("price", Value::Integer(6));
        t.record_change("qty", Value::Integer(1));
        assert!(!t.is_field_dirty("qty"));
        assert!(t.is_dirty());
    }

    #[test]
    fn same_value_is_noop() {
        let mut t = loaded(&[("qty", 1)]);
        assert!(!t.record_change("qty", Value::Integer(1)));
        assert!(!t.is_dirty());
    }

    #[test]
    fn absent_field_counts_as_null() {
        let mut t = ChangeTracker::new_record();
        assert!(!t.record_change("note", Value::Null));
        assert!(t.record_change("note", Value::from("x")));
        assert_eq!(t.dirty_fields().get("note"), Some(&Value::Null));
    }

    #[test]
    fn snapshot_restores_dirty_map() {
        let mut t = loaded(&[("qty", 1)]);
        t.record_change("qty", Value::Integer(2));
        let snap = t.snapshot();

        t.record_change("qty", Value::Integer(9));
        t.mark_saved();
        t.restore(snap);

        assert_eq!(t.get("qty"), Some(&Value::Integer(2)));
        assert_eq!(t.dirty_fields().get("qty"), Some(&Value::Integer(1)));
        assert!(!t.is_new());
    }

    #[test]
    fn changed_values_are_current() {
        let mut t = loaded(&[("a", 1), ("b", 2)]);
        t.record_change("b", Value::Integer(3));
        let changed = t.changed_values();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed.get("b"), Some(&Value::Integer(3)));
        assert_eq!(t.original("b"), Value::Integer(2));
    }

    proptest! {
        #[test]
        fn set_then_revert_leaves_field_clean(
            original in any::<i64>(),
            other in any::<i64>(),
            steps in proptest::collection::vec(any::<i64>(), 0..5),
        ) {
            let mut t = loaded(&[("f", original), ("g", 0)]);
            t.record_change("g", Value::Integer(other));
            for step in steps {
                t.record_change("f", Value::Integer(step));
            }
            t.record_change("f", Value::Integer(original));

            prop_assert!(!t.is_field_dirty("f"));
            prop_assert_eq!(t.is_dirty(), other != 0);
        }
    }
}
