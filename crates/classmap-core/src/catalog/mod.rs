//! Schema catalog.
//!
//! Records, per schema name, the mapping produced by the last successful import:
//! class strategies, tables in physical column order, relationship mappings and
//! the array property path registry.

#[allow(clippy::module_inception)]
mod catalog;
mod entry;

pub use catalog::SchemaCatalog;
pub(crate) use catalog::history_key;
pub use entry::{assign_path_ids, CatalogEntry, PropertyPathEntry};
