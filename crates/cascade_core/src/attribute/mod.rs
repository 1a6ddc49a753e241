//! Entity-attribute-value storage.
//!
//! An attribute set declares named, typed attributes in a definitions
//! table; an [`AttributeStore`] holds the values one object has for them,
//! stored one row per attribute in a values table.

mod cache;
mod definition;
mod store;

pub use cache::{DefinitionCache, DefinitionKey};
pub use definition::{definition_columns, value_columns, AttributeDefinition, AttributeSetDef};
pub use store::{AttributeSnapshot, AttributeStore, LoadState};
