//! Entity types and entity nodes.

mod behavior;
mod entity_type;
mod node;

pub use behavior::{DefaultBehavior, EntityBehavior, FieldErrors};
pub use entity_type::{EntityType, DEFAULT_RESOURCE};
pub use node::EntityNode;
