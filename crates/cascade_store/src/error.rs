//! Error types for store operations.

use cascade_value::ValueError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The named table does not exist.
    #[error("table not found: {table}")]
    TableNotFound {
        /// The table name.
        table: String,
    },

    /// The named column does not exist in the table.
    #[error("unknown column {column} in table {table}")]
    ColumnNotFound {
        /// The table name.
        table: String,
        /// The column name.
        column: String,
    },

    /// A constraint (not-null, unique key, type) was violated.
    #[error("constraint violation: {message}")]
    ConstraintViolation {
        /// Description of the violated constraint.
        message: String,
    },

    /// Transaction control was used in the wrong state.
    #[error("transaction error: {message}")]
    Transaction {
        /// Why the transaction call was rejected.
        message: String,
    },

    /// No connection is registered under the resource name.
    #[error("resource not found: {name}")]
    ResourceNotFound {
        /// The resource name.
        name: String,
    },

    /// A failure reported by the backend itself.
    #[error("store failure [{code}]: {message}")]
    Backend {
        /// Backend error code.
        code: String,
        /// Backend error message.
        message: String,
    },

    /// A value could not be stored in a column of the declared type.
    #[error("value error: {0}")]
    Value(#[from] ValueError),
}

impl StoreError {
    /// Creates a table-not-found error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    /// Creates a column-not-found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Creates a transaction state error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a resource-not-found error.
    pub fn resource_not_found(name: impl Into<String>) -> Self {
        Self::ResourceNotFound { name: name.into() }
    }

    /// Creates a backend error.
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            code: code.into(),
            message: message.into(),
        }
    }

    /// SQLSTATE-style code describing the failure class.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::TableNotFound { .. } => "42S02",
            Self::ColumnNotFound { .. } => "42S22",
            Self::ConstraintViolation { .. } => "23000",
            Self::Transaction { .. } => "25000",
            Self::ResourceNotFound { .. } => "08001",
            Self::Backend { code, .. } => code,
            Self::Value(_) => "22018",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(StoreError::table_not_found("t").code(), "42S02");
        assert_eq!(StoreError::backend("HY000", "boom").code(), "HY000");
        assert_eq!(StoreError::constraint("x").code(), "23000");
    }

    #[test]
    fn display_includes_code_for_backend() {
        let e = StoreError::backend("HY000", "disk full");
        assert_eq!(e.to_string(), "store failure [HY000]: disk full");
    }
}
