//! Transaction scope.

use crate::error::CoreResult;
use cascade_store::Connection;
use std::sync::Arc;

/// A transaction opened, or joined, by one top-level operation.
///
/// Dropping an owning scope without finishing it rolls the transaction back.
pub struct TransactionScope {
    connection: Arc<dyn Connection>,
    owned: bool,
    finished: bool,
}

impl TransactionScope {
    /// Opens a transaction unless one is already active.
    ///
    /// # Errors
    ///
    /// Returns an error if `begin` fails.
    pub fn open(connection: Arc<dyn Connection>) -> CoreResult<Self> {
        let owned = if connection.in_transaction() {
            tracing::debug!("joined active transaction");
            false
        } else {
            connection.begin()?;
            tracing::debug!("opened transaction");
            true
        };
        Ok(Self {
            connection,
            owned,
            finished: false,
        })
    }

    /// Returns true if this scope started the transaction.
    #[must_use]
    pub fn owns(&self) -> bool {
        self.owned
    }

    /// Commits if this scope owns the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the commit. The transaction is
    /// rolled back when the scope is dropped.
    pub fn commit(mut self) -> CoreResult<()> {
        if self.owned {
            self.connection.commit()?;
            tracing::debug!("committed transaction");
        }
        self.finished = true;
        Ok(())
    }

    /// Rolls back if this scope owns the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the rollback.
    pub fn rollback(mut self) -> CoreResult<()> {
        self.finished = true;
        if self.owned {
            self.connection.rollback()?;
            tracing::debug!("rolled back transaction");
        }
        Ok(())
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.owned && !self.finished && self.connection.in_transaction() {
            if let Err(err) = self.connection.rollback() {
                tracing::error!(error = %err, "rollback of abandoned transaction failed");
            } else {
                tracing::warn!("abandoned transaction rolled back");
            }
        }
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("owned", &self.owned)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_store::{ColumnSchema, MemoryConnection, Operation, Row, TableSchema};
    use cascade_value::{DataType, Value};

    fn store() -> Arc<MemoryConnection> {
        let conn = Arc::new(MemoryConnection::new());
        conn.create_table(
            TableSchema::new("t")
                .column(ColumnSchema::id("id"))
                .column(ColumnSchema::new("v", DataType::Integer)),
        );
        conn
    }

    fn row() -> Row {
        let mut row = Row::new();
        row.insert("v".into(), Value::Integer(1));
        row
    }

    #[test]
    fn owner_commits() {
        let conn = store();
        let scope = TransactionScope::open(conn.clone()).unwrap();
        assert!(scope.owns());
        conn.insert("t", &row()).unwrap();
        scope.commit().unwrap();
        assert!(!conn.in_transaction());
        assert_eq!(conn.rows("t").len(), 1);
    }

    #[test]
    fn joined_scope_leaves_transaction_alone() {
        let conn = store();
        conn.begin().unwrap();
        let scope = TransactionScope::open(conn.clone()).unwrap();
        assert!(!scope.owns());
        scope.rollback().unwrap();
        assert!(conn.in_transaction());
        conn.commit().unwrap();
    }

    #[test]
    fn drop_rolls_back() {
        let conn = store();
        {
            let _scope = TransactionScope::open(conn.clone()).unwrap();
            conn.insert("t", &row()).unwrap();
        }
        assert!(!conn.in_transaction());
        assert!(conn.rows("t").is_empty());
    }

    #[test]
    fn failed_commit_rolls_back_on_drop() {
        let conn = store();
        conn.fail_next(Operation::Commit, None);
        let scope = TransactionScope::open(conn.clone()).unwrap();
        conn.insert("t", &row()).unwrap();
        assert!(scope.commit().is_err());
        assert!(!conn.in_transaction());
        assert!(conn.rows("t").is_empty());
    }
}
