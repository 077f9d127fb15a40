//! Flattening of properties into columns.

use super::naming::{join_name, join_path, ColumnRenames};
use super::table::{ColumnDef, ColumnRole, SqlKind, CLASS_ID_COLUMN, VALUE_COLUMN};
use crate::error::{Error, Result};
use crate::schema::{ClassDef, PrimitiveType, PropertyDef, PropertyKind, SchemaDef};
use std::collections::HashMap;

/// Element type of an array property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayElement {
    Primitive(PrimitiveType),
    Struct(String),
}

impl ArrayElement {
    /// Name used in the satellite table name.
    pub fn type_name(&self) -> &str {
        match self {
            ArrayElement::Primitive(p) => p.type_name(),
            ArrayElement::Struct(class) => class,
        }
    }
}

/// An array property reached while flattening, stored in a satellite table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayPath {
    /// Class declaring the outermost property of the path.
    pub owner: String,
    /// Dot path from the owner to the array property.
    pub path: String,
    /// Element type.
    pub element: ArrayElement,
}

/// Columns and array paths produced by flattening.
#[derive(Debug, Default)]
pub struct Flattened {
    pub columns: Vec<ColumnDef>,
    pub arrays: Vec<ArrayPath>,
}

/// Flattens primitive, point and struct properties into ordered columns.
pub struct ColumnSynthesizer<'a> {
    schema: &'a SchemaDef,
    renames: &'a ColumnRenames,
}

impl<'a> ColumnSynthesizer<'a> {
    /// Create a synthesizer over a schema.
    pub fn new(schema: &'a SchemaDef, renames: &'a ColumnRenames) -> Self {
        Self { schema, renames }
    }

    /// Flatten a property declared by `owner`.
    ///
    /// `prefix` is the path of the struct property containing `property`, if any.
    pub fn flatten(&self, owner: &str, property: &PropertyDef, prefix: Option<&str>) -> Result<Flattened> {
        let mut out = Flattened::default();
        let name_prefix = prefix.map(|p| self.column_prefix(owner, p));
        let mut stack = Vec::new();
        self.flatten_into(
            owner,
            property,
            prefix,
            name_prefix.as_deref(),
            &mut stack,
            &mut out,
        )?;
        Ok(out)
    }

    /// Flatten every property of a class in declaration order.
    pub fn flatten_class(&self, class: &ClassDef) -> Result<Flattened> {
        let mut out = Flattened::default();
        let mut issues = Vec::new();
        for property in &class.properties {
            match self.flatten(&class.name, property, None) {
                Ok(flat) => {
                    out.columns.extend(flat.columns);
                    out.arrays.extend(flat.arrays);
                }
                Err(e) => issues.push(e),
            }
        }
        Error::from_issues(issues)?;
        Ok(out)
    }

    /// Columns of a primitive array element: `Value`, or the point coordinates.
    pub fn element_columns(primitive: PrimitiveType) -> Vec<ColumnDef> {
        let kind = SqlKind::for_primitive(primitive);
        let owner = primitive.type_name();
        if primitive.is_point() {
            primitive
                .coordinates()
                .iter()
                .map(|axis| ColumnDef::property(*axis, format!("{owner}.{axis}"), kind))
                .collect()
        } else {
            vec![ColumnDef::property(VALUE_COLUMN, owner, kind)]
        }
    }

    // Column name prefix of an already-flattened path, honouring renames on every segment.
    fn column_prefix(&self, owner: &str, path: &str) -> String {
        let mut name: Option<String> = None;
        let mut walked: Option<String> = None;
        for segment in path.split('.') {
            let current = join_path(walked.as_deref(), segment);
            name = Some(match self.renames.get(owner, &current) {
                Some(renamed) => renamed.to_string(),
                None => join_name(name.as_deref(), segment),
            });
            walked = Some(current);
        }
        name.unwrap_or_default()
    }

    fn flatten_into(
        &self,
        owner: &str,
        property: &PropertyDef,
        path_prefix: Option<&str>,
        name_prefix: Option<&str>,
        stack: &mut Vec<String>,
        out: &mut Flattened,
    ) -> Result<()> {
        let path = join_path(path_prefix, &property.name);
        let name = match self.renames.get(owner, &path) {
            Some(renamed) => renamed.to_string(),
            None => join_name(name_prefix, &property.name),
        };
        let qualified = format!("{owner}.{path}");

        match &property.kind {
            PropertyKind::Primitive { primitive } => {
                let kind = SqlKind::for_primitive(*primitive);
                if primitive.is_point() {
                    for axis in primitive.coordinates() {
                        out.columns.push(ColumnDef::property(
                            format!("{name}_{axis}"),
                            format!("{qualified}.{axis}"),
                            kind,
                        ));
                    }
                } else {
                    out.columns.push(ColumnDef::property(name, qualified, kind));
                }
            }
            PropertyKind::Struct { class } => {
                let structure = self.struct_class(class, &qualified)?;
                if stack.iter().any(|s| s == class) {
                    return Err(Error::invalid(
                        qualified,
                        format!("struct {class} contains itself"),
                    ));
                }
                stack.push(class.clone());
                for sub in &structure.properties {
                    self.flatten_into(owner, sub, Some(&path), Some(&name), stack, out)?;
                }
                stack.pop();
            }
            PropertyKind::PrimitiveArray { primitive } => out.arrays.push(ArrayPath {
                owner: owner.to_string(),
                path,
                element: ArrayElement::Primitive(*primitive),
            }),
            PropertyKind::StructArray { class } => {
                self.struct_class(class, &qualified)?;
                out.arrays.push(ArrayPath {
                    owner: owner.to_string(),
                    path,
                    element: ArrayElement::Struct(class.clone()),
                });
            }
        }
        Ok(())
    }

    /// Look up a struct class by name.
    pub fn struct_def(&self, name: &str) -> Result<&'a ClassDef> {
        self.struct_class(name, name)
    }

    fn struct_class(&self, name: &str, referenced_by: &str) -> Result<&'a ClassDef> {
        match self.schema.get_class(name) {
            Some(class) if class.is_struct() => Ok(class),
            Some(class) => Err(Error::invalid(
                referenced_by,
                format!("{name} is a {}, not a struct", class.kind),
            )),
            None => Err(Error::invalid(
                referenced_by,
                format!("struct class {name} is not defined"),
            )),
        }
    }
}

// Where a column in a set came from: declaring class and path below it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    owner: String,
    path: String,
}

/// Ordered, name-unique column list of one table.
///
/// Sibling classes of a shared table may contribute the same column: it is kept
/// once when name, relative property path and storage kind all agree.
#[derive(Debug)]
pub struct ColumnSet {
    table: String,
    columns: Vec<ColumnDef>,
    origins: Vec<Option<Origin>>,
    index: HashMap<String, usize>,
}

impl ColumnSet {
    /// Create an empty set for a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            origins: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// A set for a class table, starting with `ECInstanceId` and, for a shared
    /// table, `ECClassId`.
    pub fn class_table(table: impl Into<String>, shared: bool) -> Self {
        let mut set = Self::new(table);
        set.append(ColumnDef::instance_id(), None);
        if shared {
            set.append(
                ColumnDef::system(CLASS_ID_COLUMN, ColumnRole::ClassId, SqlKind::BigInt),
                None,
            );
        }
        set
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add an engine-managed or foreign key column.
    pub fn push_system(&mut self, column: ColumnDef) -> Result<()> {
        self.insert(column, None)
    }

    /// Add a property column declared by `owner`.
    pub fn push(&mut self, owner: &str, column: ColumnDef) -> Result<()> {
        let origin = column.property_path.as_deref().map(|qualified| Origin {
            owner: owner.to_string(),
            path: qualified
                .strip_prefix(owner)
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(qualified)
                .to_string(),
        });
        self.insert(column, origin)
    }

    fn append(&mut self, column: ColumnDef, origin: Option<Origin>) {
        self.index.insert(column.name.clone(), self.columns.len());
        self.columns.push(column);
        self.origins.push(origin);
    }

    fn insert(&mut self, column: ColumnDef, origin: Option<Origin>) -> Result<()> {
        let Some(&existing_at) = self.index.get(&column.name) else {
            self.append(column, origin);
            return Ok(());
        };

        let existing = &self.columns[existing_at];
        let shareable = match (&self.origins[existing_at], &origin) {
            (Some(a), Some(b)) => {
                a.owner != b.owner
                    && a.path == b.path
                    && existing.kind == column.kind
                    && existing.role == ColumnRole::Property
                    && column.role == ColumnRole::Property
            }
            _ => false,
        };
        if shareable {
            return Ok(());
        }
        Err(Error::NamingCollision {
            table: self.table.clone(),
            name: column.name.clone(),
            first: existing.origin(),
            second: column.origin(),
        })
    }

    /// Check if a column name is taken.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in insertion order.
    pub fn into_columns(self) -> Vec<ColumnDef> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::SchemaVersion;

    fn schema() -> SchemaDef {
        SchemaDef::new("Geo", "g", SchemaVersion::new(1, 0))
            .with_class(
                ClassDef::structure("Inner")
                    .with_property(PropertyDef::primitive("a", PrimitiveType::String))
                    .with_property(PropertyDef::primitive("z", PrimitiveType::Point3d)),
            )
            .with_class(
                ClassDef::structure("Outer")
                    .with_property(PropertyDef::primitive("k", PrimitiveType::Int64))
                    .with_property(PropertyDef::structure("in", "Inner"))
                    .with_property(PropertyDef::primitive_array("tags", PrimitiveType::String)),
            )
            .with_class(
                ClassDef::entity("Owner")
                    .with_property(PropertyDef::primitive("p", PrimitiveType::Point2d))
                    .with_property(PropertyDef::structure("o", "Outer"))
                    .with_property(PropertyDef::struct_array("items", "Inner")),
            )
    }

    fn names(columns: &[ColumnDef]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_flatten_point_and_struct() {
        let schema = schema();
        let renames = ColumnRenames::new();
        let synth = ColumnSynthesizer::new(&schema, &renames);
        let owner = schema.get_class("Owner").unwrap();

        let flat = synth.flatten_class(owner).unwrap();
        assert_eq!(
            names(&flat.columns),
            vec!["p_X", "p_Y", "o_k", "o_in_a", "o_in_z_X", "o_in_z_Y", "o_in_z_Z"]
        );
        assert_eq!(flat.columns[3].property_path.as_deref(), Some("Owner.o.in.a"));
        assert!(flat.columns.iter().all(|c| c.nullable));

        let paths: Vec<_> = flat.arrays.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["o.tags", "items"]);
        assert_eq!(flat.arrays[1].element, ArrayElement::Struct("Inner".into()));
    }

    #[test]
    fn test_rename_applies_to_subtree() {
        let schema = schema();
        let renames = ColumnRenames::new()
            .with("Owner.o.in", "Inner")
            .with("Owner.p", "Pos");
        let synth = ColumnSynthesizer::new(&schema, &renames);
        let flat = synth.flatten_class(schema.get_class("Owner").unwrap()).unwrap();
        assert_eq!(
            names(&flat.columns),
            vec!["Pos_X", "Pos_Y", "o_k", "Inner_a", "Inner_z_X", "Inner_z_Y", "Inner_z_Z"]
        );
    }

    #[test]
    fn test_flatten_with_prefix() {
        let schema = schema();
        let renames = ColumnRenames::new().with("Owner.o", "Out");
        let synth = ColumnSynthesizer::new(&schema, &renames);
        let inner = PropertyDef::structure("in", "Inner");
        let flat = synth.flatten("Owner", &inner, Some("o")).unwrap();
        assert_eq!(
            names(&flat.columns),
            vec!["Out_in_a", "Out_in_z_X", "Out_in_z_Y", "Out_in_z_Z"]
        );
    }

    #[test]
    fn test_element_columns() {
        let cols = ColumnSynthesizer::element_columns(PrimitiveType::Int32);
        assert_eq!(names(&cols), vec!["Value"]);
        let cols = ColumnSynthesizer::element_columns(PrimitiveType::Point2d);
        assert_eq!(names(&cols), vec!["X", "Y"]);
    }

    #[test]
    fn test_unknown_struct_is_invalid() {
        let schema = schema();
        let renames = ColumnRenames::new();
        let synth = ColumnSynthesizer::new(&schema, &renames);
        let err = synth
            .flatten("Owner", &PropertyDef::structure("x", "Missing"), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    }

    #[test]
    fn test_class_table_set_starts_with_system_columns() {
        let own = ColumnSet::class_table("lb_Sample", false);
        assert_eq!(own.len(), 1);

        let mut shared = ColumnSet::class_table("sc_Furniture", true);
        let err = shared
            .push("Chair", ColumnDef::property("ECClassId", "Chair.ECClassId", SqlKind::BigInt))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NamingCollision);

        let names: Vec<_> = shared.into_columns().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["ECInstanceId", "ECClassId"]);
    }

    #[test]
    fn test_column_set_sharing_and_collision() {
        let mut set = ColumnSet::new("sc_Furniture");
        set.push_system(ColumnDef::instance_id()).unwrap();
        set.push("Chair", ColumnDef::property("Type", "Chair.Type", SqlKind::Text))
            .unwrap();
        // Same relative path and kind from a sibling: shared.
        set.push("Desk", ColumnDef::property("Type", "Desk.Type", SqlKind::Text))
            .unwrap();
        assert_eq!(set.len(), 2);

        // Same name, different kind.
        let err = set
            .push("Lamp", ColumnDef::property("Type", "Lamp.Type", SqlKind::Integer))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NamingCollision);

        // Two paths of one class.
        set.push("Desk", ColumnDef::property("a_b", "Desk.a.b", SqlKind::Text))
            .unwrap();
        assert!(set
            .push("Desk", ColumnDef::property("a_b", "Desk.a_b", SqlKind::Text))
            .is_err());

        // Clash with a system column.
        assert!(set
            .push("Desk", ColumnDef::property("ECInstanceId", "Desk.ECInstanceId", SqlKind::BigInt))
            .is_err());
    }
}
