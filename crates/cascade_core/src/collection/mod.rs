//! Keyed collections of entities.
//!
//! A [`CollectionNode`] holds members of one entity type in insertion
//! order under a key. New members get temporary integer keys; once saved
//! they are re-keyed by their generated primary key.

mod node;

pub use node::CollectionNode;
