//! Mapped tables and columns.

use crate::schema::PrimitiveType;
use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;

/// Instance id column present in every table.
pub const INSTANCE_ID_COLUMN: &str = "ECInstanceId";
/// Discriminator column of shared hierarchy tables.
pub const CLASS_ID_COLUMN: &str = "ECClassId";
/// Owning row id in satellite tables.
pub const PARENT_ID_COLUMN: &str = "ParentECInstanceId";
/// Property path id in satellite tables.
pub const PROPERTY_PATH_ID_COLUMN: &str = "ECPropertyPathId";
/// Element position in satellite tables.
pub const ARRAY_INDEX_COLUMN: &str = "ECArrayIndex";
/// Source endpoint in link tables.
pub const SOURCE_ID_COLUMN: &str = "SourceECInstanceId";
/// Source class in link tables with a polymorphic source.
pub const SOURCE_CLASS_ID_COLUMN: &str = "SourceECClassId";
/// Target endpoint in link tables.
pub const TARGET_ID_COLUMN: &str = "TargetECInstanceId";
/// Target class in link tables with a polymorphic target.
pub const TARGET_CLASS_ID_COLUMN: &str = "TargetECClassId";
/// Element column of primitive satellites.
pub const VALUE_COLUMN: &str = "Value";

/// Storage kind of a column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum SqlKind {
    Integer,
    BigInt,
    Real,
    Text,
    Boolean,
    Timestamp,
    Blob,
}

impl SqlKind {
    /// Storage kind for a primitive; point coordinates are `Real`.
    pub fn for_primitive(primitive: PrimitiveType) -> Self {
        match primitive {
            PrimitiveType::Int32 => SqlKind::Integer,
            PrimitiveType::Int64 => SqlKind::BigInt,
            PrimitiveType::Double | PrimitiveType::Point2d | PrimitiveType::Point3d => {
                SqlKind::Real
            }
            PrimitiveType::String => SqlKind::Text,
            PrimitiveType::DateTime => SqlKind::Timestamp,
            PrimitiveType::Binary => SqlKind::Blob,
            PrimitiveType::Boolean => SqlKind::Boolean,
        }
    }

    /// SQL type name.
    pub fn to_sql(&self) -> &'static str {
        match self {
            SqlKind::Integer => "INTEGER",
            SqlKind::BigInt => "BIGINT",
            SqlKind::Real => "REAL",
            SqlKind::Text => "TEXT",
            SqlKind::Boolean => "BOOLEAN",
            SqlKind::Timestamp => "TIMESTAMP",
            SqlKind::Blob => "BLOB",
        }
    }
}

impl fmt::Display for SqlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

/// What a column stores.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum ColumnRole {
    InstanceId,
    ClassId,
    ParentInstanceId,
    PropertyPathId,
    ArrayIndex,
    Property,
    ForeignKey,
    LinkSource,
    LinkSourceClass,
    LinkTarget,
    LinkTargetClass,
}

impl ColumnRole {
    /// Check if the column is engine-managed rather than property-derived.
    pub fn is_system(&self) -> bool {
        !matches!(self, ColumnRole::Property | ColumnRole::ForeignKey)
    }
}

/// A column of a mapped table.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct ColumnDef {
    /// Column name (unique within its table).
    pub name: String,
    /// Column role.
    pub role: ColumnRole,
    /// `Owner.dot.path` of the property this column stores; for foreign keys, the
    /// relationship name. Absent for system columns.
    pub property_path: Option<String>,
    /// Storage kind.
    pub kind: SqlKind,
    /// Whether the column admits NULL.
    pub nullable: bool,
}

impl ColumnDef {
    /// A NOT NULL engine-managed column.
    pub fn system(name: impl Into<String>, role: ColumnRole, kind: SqlKind) -> Self {
        Self {
            name: name.into(),
            role,
            property_path: None,
            kind,
            nullable: false,
        }
    }

    /// A nullable property-derived column.
    pub fn property(name: impl Into<String>, path: impl Into<String>, kind: SqlKind) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::Property,
            property_path: Some(path.into()),
            kind,
            nullable: true,
        }
    }

    /// A nullable foreign key column for a relationship.
    pub fn foreign_key(name: impl Into<String>, relationship: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::ForeignKey,
            property_path: Some(relationship.into()),
            kind: SqlKind::BigInt,
            nullable: true,
        }
    }

    /// The instance id column.
    pub fn instance_id() -> Self {
        Self::system(INSTANCE_ID_COLUMN, ColumnRole::InstanceId, SqlKind::BigInt)
    }

    /// Check if the column is engine-managed.
    pub fn is_system(&self) -> bool {
        self.role.is_system()
    }

    /// Where the column comes from, for diagnostics.
    pub fn origin(&self) -> String {
        match (&self.role, &self.property_path) {
            (ColumnRole::ForeignKey, Some(rel)) => format!("relationship {rel}"),
            (_, Some(path)) => format!("property {path}"),
            (_, None) => "system column".to_string(),
        }
    }
}

/// Kind of a mapped table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum TableKind {
    /// Stores instances of one class or one shared hierarchy.
    Class,
    /// Satellite storing array elements.
    Array,
    /// Stores relationship instances.
    Link,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Class => write!(f, "class"),
            TableKind::Array => write!(f, "array"),
            TableKind::Link => write!(f, "link"),
        }
    }
}

/// A relational table produced by the mapping.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct MappedTable {
    /// Table name.
    pub name: String,
    /// Table kind.
    pub kind: TableKind,
    /// Owning class, element type or relationship.
    pub owner: String,
    /// Columns in physical order.
    pub columns: Vec<ColumnDef>,
}

impl MappedTable {
    /// Create a table without columns.
    pub fn new(name: impl Into<String>, kind: TableKind, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: owner.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in physical order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Check if the table carries a class discriminator.
    pub fn has_discriminator(&self) -> bool {
        self.columns.iter().any(|c| c.role == ColumnRole::ClassId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kinds() {
        assert_eq!(SqlKind::for_primitive(PrimitiveType::Int32), SqlKind::Integer);
        assert_eq!(SqlKind::for_primitive(PrimitiveType::Point3d), SqlKind::Real);
        assert_eq!(SqlKind::for_primitive(PrimitiveType::DateTime).to_sql(), "TIMESTAMP");
    }

    #[test]
    fn test_column_constructors() {
        let id = ColumnDef::instance_id();
        assert!(!id.nullable);
        assert!(id.is_system());

        let prop = ColumnDef::property("o_a", "Owner.o.a", SqlKind::Text);
        assert!(prop.nullable);
        assert!(!prop.is_system());
        assert_eq!(prop.origin(), "property Owner.o.a");

        let fk = ColumnDef::foreign_key("CompanyId", "CompanyEmploysEmployee");
        assert_eq!(fk.kind, SqlKind::BigInt);
        assert_eq!(fk.origin(), "relationship CompanyEmploysEmployee");
    }

    #[test]
    fn test_table_lookup() {
        let table = MappedTable::new("sc_Furniture", TableKind::Class, "Furniture")
            .with_column(ColumnDef::instance_id())
            .with_column(ColumnDef::system(
                CLASS_ID_COLUMN,
                ColumnRole::ClassId,
                SqlKind::BigInt,
            ));
        assert!(table.has_discriminator());
        assert_eq!(table.column_names(), vec![INSTANCE_ID_COLUMN, CLASS_ID_COLUMN]);
        assert!(table.get_column("Type").is_none());
    }
}
