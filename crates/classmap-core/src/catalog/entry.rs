//! Catalog entry - the persisted mapping of one schema.

use crate::error::{Error, Result};
use crate::mapping::{
    array_table_name, ArrayPath, ClassMapping, MappedTable, RelationshipMapping, SchemaMapping,
};
use crate::schema::SchemaVersion;
use rkyv::{Archive, Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A registered array property path and the id stored in `ECPropertyPathId`.
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
pub struct PropertyPathEntry {
    /// Stable numeric id.
    pub id: u32,
    /// Class declaring the outermost property.
    pub owner: String,
    /// Dot path to the array property.
    pub path: String,
    /// Satellite table holding the elements.
    pub table: String,
}

/// The persisted mapping of one schema.
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
pub struct CatalogEntry {
    /// Schema name (catalog key).
    pub schema_name: String,
    /// Table prefix.
    pub alias: String,
    /// Imported version.
    pub version: SchemaVersion,
    /// Class strategies.
    pub classes: Vec<ClassMapping>,
    /// Tables with their physical column order.
    pub tables: Vec<MappedTable>,
    /// Relationship mappings.
    pub relationships: Vec<RelationshipMapping>,
    /// Array property path registry.
    pub property_paths: Vec<PropertyPathEntry>,
    /// Import timestamp (microseconds since Unix epoch).
    pub imported_at: u64,
}

impl CatalogEntry {
    /// Record a mapping, keeping the path ids of `previous` paths.
    pub fn from_mapping(mapping: &SchemaMapping, previous: &[PropertyPathEntry]) -> Self {
        Self {
            schema_name: mapping.schema_name.clone(),
            alias: mapping.alias.clone(),
            version: mapping.version,
            classes: mapping.classes.clone(),
            tables: mapping.tables.clone(),
            relationships: mapping.relationships.clone(),
            property_paths: assign_path_ids(&mapping.alias, &mapping.array_paths, previous),
            imported_at: current_timestamp(),
        }
    }

    /// Get a class's recorded mapping.
    pub fn class(&self, name: &str) -> Option<&ClassMapping> {
        self.classes.iter().find(|c| c.class == name)
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&MappedTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Id of a registered array property path.
    pub fn path_id(&self, owner: &str, path: &str) -> Option<u32> {
        self.property_paths
            .iter()
            .find(|p| p.owner == owner && p.path == path)
            .map(|p| p.id)
    }

    /// Serialize the entry to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize an entry from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn for_test(schema: &crate::schema::SchemaDef, classes: Vec<ClassMapping>) -> Self {
        Self {
            schema_name: schema.name.clone(),
            alias: schema.alias.clone(),
            version: schema.version,
            classes,
            tables: Vec::new(),
            relationships: Vec::new(),
            property_paths: Vec::new(),
            imported_at: 0,
        }
    }
}

/// Registry entries for `paths`: known paths keep their id, new ones are numbered
/// after the highest id ever assigned.
pub fn assign_path_ids(
    alias: &str,
    paths: &[ArrayPath],
    previous: &[PropertyPathEntry],
) -> Vec<PropertyPathEntry> {
    let mut next = previous.iter().map(|p| p.id).max().unwrap_or(0) + 1;
    paths
        .iter()
        .map(|path| {
            let id = match previous
                .iter()
                .find(|p| p.owner == path.owner && p.path == path.path)
            {
                Some(known) => known.id,
                None => {
                    let id = next;
                    next += 1;
                    id
                }
            };
            PropertyPathEntry {
                id,
                owner: path.owner.clone(),
                path: path.path.clone(),
                table: array_table_name(alias, path.element.type_name()),
            }
        })
        .collect()
}

/// Microseconds since the Unix epoch.
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ArrayElement, SchemaMapper};
    use crate::schema::{ClassDef, PrimitiveType, PropertyDef, SchemaDef};

    fn schema() -> SchemaDef {
        SchemaDef::new("Lab", "lb", SchemaVersion::new(1, 0))
            .with_class(
                ClassDef::entity("Sample")
                    .with_property(PropertyDef::primitive("Label", PrimitiveType::String))
                    .with_property(PropertyDef::primitive_array("Readings", PrimitiveType::Double)),
            )
    }

    #[test]
    fn test_entry_roundtrip() {
        let schema = schema();
        let mapping = SchemaMapper::new(&schema).map().unwrap();
        let entry = CatalogEntry::from_mapping(&mapping, &[]);

        let bytes = entry.to_bytes().unwrap();
        let decoded = CatalogEntry::from_bytes(&bytes).unwrap();
        assert_eq!(entry, decoded);
        assert_eq!(decoded.path_id("Sample", "Readings"), Some(1));
        assert!(decoded.get_table("lb_ArrayOfDouble").is_some());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(CatalogEntry::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_path_ids_are_stable() {
        let previous = vec![
            PropertyPathEntry {
                id: 1,
                owner: "A".into(),
                path: "x".into(),
                table: "s_ArrayOfInt32".into(),
            },
            PropertyPathEntry {
                id: 4,
                owner: "B".into(),
                path: "y".into(),
                table: "s_ArrayOfInt32".into(),
            },
        ];
        let paths = vec![
            ArrayPath {
                owner: "C".into(),
                path: "z".into(),
                element: ArrayElement::Primitive(PrimitiveType::String),
            },
            ArrayPath {
                owner: "B".into(),
                path: "y".into(),
                element: ArrayElement::Primitive(PrimitiveType::Int32),
            },
        ];
        let assigned = assign_path_ids("s", &paths, &previous);
        assert_eq!(assigned[0].id, 5);
        assert_eq!(assigned[0].table, "s_ArrayOfString");
        assert_eq!(assigned[1].id, 4);
    }
}
