//! Connection trait definition.

use crate::error::StoreResult;
use crate::schema::TableSchema;
use cascade_value::Value;
use std::collections::BTreeMap;

/// One row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// A single filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value` (`IS NULL` when the value is null).
    Eq(String, Value),
    /// `column IN (values)`. An empty list matches nothing.
    In(String, Vec<Value>),
}

impl Predicate {
    /// Returns true if `row` satisfies this condition.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Eq(column, value) => row.get(column).unwrap_or(&Value::Null) == value,
            Predicate::In(column, values) => {
                let actual = row.get(column).unwrap_or(&Value::Null);
                values.iter().any(|v| v == actual)
            }
        }
    }

    /// Returns the column this condition tests.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Predicate::Eq(column, _) | Predicate::In(column, _) => column,
        }
    }
}

/// A conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Creates a filter that matches every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq(column.into(), value.into()));
        self
    }

    /// Adds a set membership condition.
    #[must_use]
    pub fn is_in(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.predicates.push(Predicate::In(column.into(), values));
        self
    }

    /// Returns the conditions.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns true if every condition holds for `row`.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }
}

/// A live connection to a relational store.
///
/// This is the only surface the persistence core needs from the SQL layer.
/// Implementations own query building and execution; the core only ever
/// filters by equality and set membership.
///
/// # Invariants
///
/// - `begin` fails if a transaction is already active; callers that want
///   join semantics check `in_transaction` first
/// - `commit` and `rollback` fail when no transaction is active
/// - `insert` returns the primary key value of the new row, generated or
///   supplied, or `None` for tables without a primary key
/// - Connections must be `Send + Sync` so they can be shared by every node
///   in an entity graph
pub trait Connection: Send + Sync {
    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already active.
    fn begin(&self) -> StoreResult<()>;

    /// Commits the active transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active or the commit fails.
    fn commit(&self) -> StoreResult<()>;

    /// Rolls back the active transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active.
    fn rollback(&self) -> StoreResult<()>;

    /// Reports whether a transaction is currently active.
    fn in_transaction(&self) -> bool;

    /// Inserts a row and returns its primary key.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown tables or columns and on constraint
    /// violations.
    fn insert(&self, table: &str, row: &Row) -> StoreResult<Option<Value>>;

    /// Updates every row matching `filter` and returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown tables or columns and on constraint
    /// violations.
    fn update(&self, table: &str, values: &Row, filter: &Filter) -> StoreResult<u64>;

    /// Deletes every row matching `filter` and returns how many went.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown tables.
    fn delete(&self, table: &str, filter: &Filter) -> StoreResult<u64>;

    /// Returns every row matching `filter` in storage order.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown tables.
    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>>;

    /// Describes a table's columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn table_schema(&self, table: &str) -> StoreResult<TableSchema>;

    /// Returns the first row matching `filter`, if any.
    ///
    /// # Errors
    ///
    /// Propagates `select` errors.
    fn select_one(&self, table: &str, filter: &Filter) -> StoreResult<Option<Row>> {
        self.select(table, filter).map(|rows| rows.into_iter().next())
    }

    /// Counts rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Propagates `select` errors.
    fn count(&self, table: &str, filter: &Filter) -> StoreResult<usize> {
        self.select(table, filter).map(|rows| rows.len())
    }
}
