//! Relations between entity types.
//!
//! A [`RelationDescriptor`] says what a relation points at, which columns
//! join the two sides, whether saves and deletes cascade into it and how
//! keys are copied across it ([`LinkType`]).

mod descriptor;
mod link;

pub use descriptor::{LinkColumn, RelationDescriptor, RelationKind, RelationTarget};
pub use link::{Direction, LinkType, Pass, Persistence};
