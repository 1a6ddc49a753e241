//! In-memory relational store for testing.

use crate::connection::{Connection, Filter, Row};
use crate::error::{StoreError, StoreResult};
use crate::schema::TableSchema;
use cascade_value::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Statement kinds that can be targeted by fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `insert`.
    Insert,
    /// `update`.
    Update,
    /// `delete`.
    Delete,
    /// `select`.
    Select,
    /// `commit`.
    Commit,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    table: Option<String>,
    skip: usize,
}

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    /// Copy of `tables` taken at `begin`, restored on rollback.
    saved: Option<BTreeMap<String, MemTable>>,
    faults: Vec<Fault>,
    writes: u64,
    transactions_begun: u64,
}

/// An in-memory relational store.
///
/// This store keeps all tables in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Demonstrations that don't need a real database
///
/// Transactions are whole-store snapshots: `begin` copies every table and
/// `rollback` puts the copy back. Primary key columns flagged
/// `auto_increment` receive generated integers starting at 1.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use cascade_store::{ColumnSchema, Connection, Filter, MemoryConnection, Row, TableSchema};
/// use cascade_value::{DataType, Value};
///
/// let conn = MemoryConnection::new();
/// conn.create_table(
///     TableSchema::new("notes")
///         .column(ColumnSchema::id("id"))
///         .column(ColumnSchema::new("body", DataType::Text)),
/// );
///
/// let mut row = Row::new();
/// row.insert("body".into(), Value::from("hello"));
/// let id = conn.insert("notes", &row).unwrap();
/// assert_eq!(id, Some(Value::Integer(1)));
/// assert_eq!(conn.count("notes", &Filter::all()).unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryConnection {
    state: Mutex<State>,
}

impl MemoryConnection {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table.
    pub fn create_table(&self, schema: TableSchema) {
        let name = schema.name().to_string();
        self.state.lock().tables.insert(
            name,
            MemTable {
                schema,
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    /// Makes the next `operation` on `table` (any table if `None`) fail.
    pub fn fail_next(&self, operation: Operation, table: Option<&str>) {
        self.fail_after(operation, table, 0);
    }

    /// Lets `skip` matching statements succeed, then fails the next one.
    pub fn fail_after(&self, operation: Operation, table: Option<&str>, skip: usize) {
        self.state.lock().faults.push(Fault {
            operation,
            table: table.map(str::to_string),
            skip,
        });
    }

    /// Removes all pending injected faults.
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Number of insert, update and delete statements executed.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }

    /// Number of transactions started with `begin`.
    #[must_use]
    pub fn transactions_begun(&self) -> u64 {
        self.state.lock().transactions_begun
    }

    /// Returns a copy of every row in `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

impl State {
    fn check_fault(&mut self, operation: Operation, table: &str) -> StoreResult<()> {
        let position = self.faults.iter().position(|f| {
            f.operation == operation && f.table.as_deref().map_or(true, |t| t == table)
        });
        let Some(index) = position else {
            return Ok(());
        };
        if self.faults[index].skip > 0 {
            self.faults[index].skip -= 1;
            return Ok(());
        }
        self.faults.remove(index);
        Err(StoreError::backend(
            "HY000",
            format!("injected {operation:?} failure on {table}"),
        ))
    }

    fn table_mut(&mut self, table: &str) -> StoreResult<&mut MemTable> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| StoreError::table_not_found(table))
    }

    fn table(&self, table: &str) -> StoreResult<&MemTable> {
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))
    }
}

impl MemTable {
    /// Coerces `values` to column types, rejecting unknown columns.
    fn typed(&self, values: &Row) -> StoreResult<Row> {
        let mut out = Row::new();
        for (column, value) in values {
            let schema = self
                .schema
                .column_named(column)
                .ok_or_else(|| StoreError::column_not_found(self.schema.name(), column))?;
            out.insert(column.clone(), schema.data_type.coerce(value.clone())?);
        }
        Ok(out)
    }

    fn check_not_null(&self, row: &Row) -> StoreResult<()> {
        for column in self.schema.columns() {
            if !column.nullable && row.get(&column.name).map_or(true, Value::is_null) {
                return Err(StoreError::constraint(format!(
                    "column {}.{} cannot be null",
                    self.schema.name(),
                    column.name
                )));
            }
        }
        Ok(())
    }

    fn insert(&mut self, values: &Row) -> StoreResult<Option<Value>> {
        let mut row = self.typed(values)?;
        for column in self.schema.columns() {
            if row.get(&column.name).map_or(true, Value::is_null) {
                if column.auto_increment {
                    row.insert(column.name.clone(), Value::Integer(self.next_id));
                    self.next_id += 1;
                } else if let Some(default) = &column.default {
                    if !row.contains_key(&column.name) {
                        row.insert(column.name.clone(), default.clone());
                    }
                }
            } else if column.auto_increment {
                if let Some(n) = row.get(&column.name).and_then(Value::as_integer) {
                    self.next_id = self.next_id.max(n + 1);
                }
            }
        }
        self.check_not_null(&row)?;

        let key = match self.schema.primary_key() {
            Some(pk) => {
                let key = row.get(&pk.name).cloned().unwrap_or(Value::Null);
                if self.rows.iter().any(|r| r.get(&pk.name) == Some(&key)) {
                    return Err(StoreError::constraint(format!(
                        "duplicate key {key} for {}.{}",
                        self.schema.name(),
                        pk.name
                    )));
                }
                Some(key)
            }
            None => None,
        };
        self.rows.push(row);
        Ok(key)
    }

    fn update(&mut self, values: &Row, filter: &Filter) -> StoreResult<u64> {
        let values = self.typed(values)?;
        let mut updated = Vec::new();
        for (index, row) in self.rows.iter().enumerate() {
            if filter.matches(row) {
                let mut next = row.clone();
                next.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.check_not_null(&next)?;
                updated.push((index, next));
            }
        }
        let count = updated.len() as u64;
        for (index, row) in updated {
            self.rows[index] = row;
        }
        Ok(count)
    }
}

impl Connection for MemoryConnection {
    fn begin(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.saved.is_some() {
            return Err(StoreError::transaction("transaction already active"));
        }
        state.saved = Some(state.tables.clone());
        state.transactions_begun += 1;
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.saved.is_none() {
            return Err(StoreError::transaction("no active transaction"));
        }
        state.check_fault(Operation::Commit, "")?;
        state.saved = None;
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        match state.saved.take() {
            Some(tables) => {
                state.tables = tables;
                Ok(())
            }
            None => Err(StoreError::transaction("no active transaction")),
        }
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().saved.is_some()
    }

    fn insert(&self, table: &str, row: &Row) -> StoreResult<Option<Value>> {
        let mut state = self.state.lock();
        state.check_fault(Operation::Insert, table)?;
        state.writes += 1;
        state.table_mut(table)?.insert(row)
    }

    fn update(&self, table: &str, values: &Row, filter: &Filter) -> StoreResult<u64> {
        let mut state = self.state.lock();
        state.check_fault(Operation::Update, table)?;
        state.writes += 1;
        state.table_mut(table)?.update(values, filter)
    }

    fn delete(&self, table: &str, filter: &Filter) -> StoreResult<u64> {
        let mut state = self.state.lock();
        state.check_fault(Operation::Delete, table)?;
        state.writes += 1;
        let t = state.table_mut(table)?;
        let before = t.rows.len();
        t.rows.retain(|row| !filter.matches(row));
        Ok((before - t.rows.len()) as u64)
    }

    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        let mut state = self.state.lock();
        state.check_fault(Operation::Select, table)?;
        Ok(state
            .table(table)?
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    fn table_schema(&self, table: &str) -> StoreResult<TableSchema> {
        Ok(self.state.lock().table(table)?.schema.clone())
    }
}
