//! # Cascade Core
//!
//! Cascading persistence orchestration for Cascade.
//!
//! This crate provides:
//! - [`ChangeTracker`], per-field dirty tracking against last-stored values
//! - [`EntityNode`], one row of a table plus its populated relations
//! - [`CollectionNode`], keyed collections of entities
//! - [`AttributeStore`], entity-attribute-value storage with lazy attributes
//! - [`RelationDescriptor`] and [`LinkType`], how relations cascade and how
//!   keys flow across them
//! - Top-level `save_all`/`delete_full` on every node, each one transaction
//!   with full rollback of in-memory state on failure
//!
//! ## Failure model
//!
//! Configuration and policy mistakes at the top level are hard failures
//! ([`CoreError`]). Everything that can go wrong while writing (validation,
//! store errors) makes the call return `Ok(false)` and leaves
//! [`ActionError`]s on the root node; the graph is then exactly as it was
//! before the call.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cascade_core::{Catalog, EntityType, LinkType, RelationDescriptor, Session};
//! use cascade_store::{ColumnSchema, MemoryConnection, ResourceRegistry, TableSchema};
//! use cascade_value::DataType;
//!
//! let conn = Arc::new(MemoryConnection::new());
//! conn.create_table(
//!     TableSchema::new("orders")
//!         .column(ColumnSchema::id("id"))
//!         .column(ColumnSchema::new("total", DataType::Float)),
//! );
//! conn.create_table(
//!     TableSchema::new("order_lines")
//!         .column(ColumnSchema::id("id"))
//!         .column(ColumnSchema::new("order_id", DataType::Integer).not_null())
//!         .column(ColumnSchema::new("qty", DataType::Integer)),
//! );
//!
//! let catalog = Catalog::new()
//!     .with_entity(
//!         EntityType::new("Order", "orders").relation(
//!             RelationDescriptor::has_many("lines", "OrderLine")
//!                 .link("id", "order_id")
//!                 .link_type(LinkType::FROM_PARENT_MAINT)
//!                 .cascade(),
//!         ),
//!     )
//!     .with_entity(EntityType::new("OrderLine", "order_lines"));
//! let session = Session::builder(ResourceRegistry::new().with("default", conn), catalog).build();
//!
//! let mut order = session.new_entity("Order").unwrap();
//! let lines = order.many_mut("lines").unwrap();
//! lines.push_new().unwrap().set("qty", 2i64).unwrap();
//! lines.push_new().unwrap().set("qty", 5i64).unwrap();
//!
//! assert!(order.save_all().unwrap());
//! let id = order.get_integer("id").unwrap().unwrap();
//! for (_, line) in order.many("lines").unwrap().iter() {
//!     assert_eq!(line.get_integer("order_id").unwrap(), Some(id));
//!     assert!(!line.has_changes());
//! }
//! assert!(!order.has_changes());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod attribute;
mod catalog;
pub mod collection;
mod config;
pub mod entity;
mod error;
mod node;
mod orchestrator;
mod policy;
pub mod relation;
mod session;
mod tracker;
pub mod transaction;

pub use attribute::{
    definition_columns, value_columns, AttributeDefinition, AttributeSetDef, AttributeSnapshot,
    AttributeStore, DefinitionCache, DefinitionKey, LoadState,
};
pub use catalog::Catalog;
pub use collection::CollectionNode;
pub use config::{AuditNames, Config};
pub use entity::{DefaultBehavior, EntityBehavior, EntityNode, EntityType, FieldErrors};
pub use error::{CoreError, CoreResult};
pub use node::{EntitySnapshot, NodeSnapshot, RelatedNode, SaveOptions};
pub use policy::{ActionError, ActionErrorSink, MutabilityPolicy, ParentLink};
pub use relation::{
    Direction, LinkColumn, LinkType, Pass, Persistence, RelationDescriptor, RelationKind,
    RelationTarget,
};
pub use session::{Session, SessionBuilder};
pub use tracker::{ChangeTracker, TrackerSnapshot};
pub use transaction::TransactionScope;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
