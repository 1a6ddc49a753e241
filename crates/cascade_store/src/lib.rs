//! # Cascade Store
//!
//! Relational store contract for Cascade.
//!
//! This crate provides the lowest-level persistence abstraction. The
//! persistence core never builds SQL itself; it speaks to a [`Connection`]
//! in terms of rows, equality filters and transactions.
//!
//! ## Design Principles
//!
//! - A connection is shared by every node of an entity graph (`Send + Sync`)
//! - Transactions do not nest; join semantics live in the caller
//! - Rows are plain column maps of [`cascade_value::Value`]
//!
//! ## Available Connections
//!
//! - [`MemoryConnection`] - For testing, with fault injection
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cascade_store::{ColumnSchema, MemoryConnection, ResourceRegistry, TableSchema};
//! use cascade_value::DataType;
//!
//! let conn = Arc::new(MemoryConnection::new());
//! conn.create_table(
//!     TableSchema::new("customers")
//!         .column(ColumnSchema::id("id"))
//!         .column(ColumnSchema::new("name", DataType::Text)),
//! );
//! let registry = ResourceRegistry::new().with("main", conn);
//! assert!(registry.resolve("main").is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod memory;
mod registry;
mod schema;

pub use connection::{Connection, Filter, Predicate, Row};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryConnection, Operation};
pub use registry::ResourceRegistry;
pub use schema::{ColumnSchema, TableSchema};
