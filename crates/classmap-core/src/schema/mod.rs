//! Object schema model.
//!
//! Classes (entities, structs, custom attributes), their ordered properties and the
//! relationship classes between entities. The model is read-only to the mapping engine.

mod class;
mod definition;
mod property;
mod relationship;
mod types;

pub use class::{ClassDef, ClassKind, StrategyHint};
pub use definition::SchemaDef;
pub use property::{PropertyDef, PropertyKind};
pub use relationship::{Direction, Multiplicity, RelationshipClassDef, RelationshipEnd, Strength};
pub use types::{PrimitiveType, SchemaVersion};
