//! Index statement generation.
//!
//! Table names are the part of an index migration that breaks across
//! servers: MySQL with `lower_case_table_names` stores them folded, and
//! PostgreSQL folds unquoted names. With `case_insensitive` the table is
//! referenced in the folded form the server resolves regardless of how the
//! migration spelled it. SQLite matches table names case-insensitively
//! already, so the flag changes nothing there.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors building an index statement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// The engine name is not recognised.
    #[error("unknown database engine '{0}' (expected mysql, postgres or sqlite)")]
    UnknownEngine(String),

    /// An index needs at least one column.
    #[error("index '{0}' has no columns")]
    NoColumns(String),

    /// An identifier cannot be quoted safely.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Result type for index statements.
pub type IndexResult<T> = Result<T, IndexError>;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// MySQL and MariaDB.
    MySql,
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
}

impl Engine {
    fn quote(self, identifier: &str) -> IndexResult<String> {
        let forbidden = match self {
            Engine::MySql => '`',
            Engine::Postgres | Engine::Sqlite => '"',
        };
        if identifier.is_empty() || identifier.contains(forbidden) || identifier.contains('\0') {
            return Err(IndexError::InvalidIdentifier(identifier.to_string()));
        }
        Ok(match self {
            Engine::MySql => format!("`{identifier}`"),
            Engine::Postgres | Engine::Sqlite => format!("\"{identifier}\""),
        })
    }

    fn table(self, table: &str, case_insensitive: bool) -> IndexResult<String> {
        match (self, case_insensitive) {
            (Engine::MySql | Engine::Postgres, true) => self.quote(&table.to_lowercase()),
            _ => self.quote(table),
        }
    }
}

impl FromStr for Engine {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Engine::MySql),
            "postgres" | "postgresql" | "pgsql" => Ok(Engine::Postgres),
            "sqlite" | "sqlite3" => Ok(Engine::Sqlite),
            _ => Err(IndexError::UnknownEngine(s.to_string())),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::MySql => "mysql",
            Engine::Postgres => "postgres",
            Engine::Sqlite => "sqlite",
        })
    }
}

/// Builds a `CREATE INDEX` statement for `engine`.
///
/// # Errors
///
/// Returns an error if `columns` is empty or an identifier cannot be
/// quoted.
pub fn create_index_statement(
    engine: Engine,
    table: &str,
    index: &str,
    columns: &[String],
    unique: bool,
    case_insensitive: bool,
) -> IndexResult<String> {
    if columns.is_empty() {
        return Err(IndexError::NoColumns(index.to_string()));
    }
    let columns = columns
        .iter()
        .map(|c| engine.quote(c.trim()))
        .collect::<IndexResult<Vec<_>>>()?
        .join(", ");
    let kind = if unique { "UNIQUE INDEX" } else { "INDEX" };
    let guard = match engine {
        Engine::MySql => "",
        Engine::Postgres | Engine::Sqlite => "IF NOT EXISTS ",
    };
    Ok(format!(
        "CREATE {kind} {guard}{} ON {} ({columns})",
        engine.quote(index)?,
        engine.table(table, case_insensitive)?,
    ))
}

/// Runs the create-index command.
pub fn run(
    engine: &str,
    table: &str,
    index: &str,
    columns: &[String],
    unique: bool,
    case_insensitive: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine: Engine = engine.parse()?;
    let statement = create_index_statement(engine, table, index, columns, unique, case_insensitive)?;
    tracing::debug!(%engine, table, index, "built index statement");
    println!("{statement};");
    Ok(())
}
