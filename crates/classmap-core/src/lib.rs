//! classmap core - class-schema to relational table mapping and evolution.
//!
//! This crate maps object schemas (entity classes with inheritance, embedded
//! structs, arrays and relationships) onto relational tables, records the
//! resulting mapping in a catalog and evolves it additively as new schema
//! versions are imported.

pub mod catalog;
pub mod ddl;
pub mod error;
pub mod import;
pub mod mapping;
pub mod migration;
pub mod schema;
pub mod store;

pub use catalog::{CatalogEntry, PropertyPathEntry, SchemaCatalog};
pub use ddl::DdlStatement;
pub use error::{Diagnostic, Error, ErrorKind, Result};
pub use import::{ImportConfig, ImportResult, ImportSummary, SchemaImporter};
pub use mapping::{
    ColumnDef, ColumnRenames, ForeignKeyNaming, MappedTable, MappingStrategy, SchemaMapper,
    SchemaMapping, TableKind,
};
pub use migration::{Evolver, MigrationPlan, MigrationStep, PlanKind, SchemaDiff};
pub use schema::{
    ClassDef, ClassKind, PrimitiveType, PropertyDef, RelationshipClassDef, RelationshipEnd,
    SchemaDef, SchemaVersion, StrategyHint,
};
pub use store::{MappingStore, SledStore, StoreConfig};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
