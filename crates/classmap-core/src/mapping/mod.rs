//! Projection of class schemas onto relational tables.
//!
//! The [`SchemaMapper`] drives the pipeline: strategies are resolved per class,
//! properties are flattened into columns, array properties get satellite tables
//! and relationships become foreign key columns or link tables.

mod arrays;
mod columns;
mod mapper;
mod naming;
mod relationships;
mod resolver;
mod table;

pub use arrays::ArrayTableBuilder;
pub use columns::{ArrayElement, ArrayPath, ColumnSet, ColumnSynthesizer, Flattened};
pub use mapper::{SchemaMapper, SchemaMapping};
pub use naming::{
    array_table_name, class_table_name, link_table_name, ColumnRenames, EndRole,
    ForeignKeyNaming,
};
pub use relationships::{MappedRelationship, RelationshipMapper, RelationshipMapping};
pub use resolver::{ClassMapping, MappingStrategy, ResolvedStrategy, StrategyResolver};
pub use table::{
    ColumnDef, ColumnRole, MappedTable, SqlKind, TableKind, ARRAY_INDEX_COLUMN, CLASS_ID_COLUMN,
    INSTANCE_ID_COLUMN, PARENT_ID_COLUMN, PROPERTY_PATH_ID_COLUMN, SOURCE_CLASS_ID_COLUMN,
    SOURCE_ID_COLUMN, TARGET_CLASS_ID_COLUMN, TARGET_ID_COLUMN, VALUE_COLUMN,
};
