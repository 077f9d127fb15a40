//! Satellite tables for array properties.

use super::columns::{ArrayElement, ArrayPath, ColumnSet, ColumnSynthesizer};
use super::naming::array_table_name;
use super::table::{
    ColumnDef, ColumnRole, MappedTable, SqlKind, TableKind, ARRAY_INDEX_COLUMN, PARENT_ID_COLUMN,
    PROPERTY_PATH_ID_COLUMN,
};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Builds one satellite table per array element type.
///
/// Array properties found inside struct elements are followed, so their
/// satellites are built too.
pub struct ArrayTableBuilder<'a> {
    alias: &'a str,
    synthesizer: &'a ColumnSynthesizer<'a>,
    tables: Vec<MappedTable>,
    elements: HashMap<String, ArrayElement>,
    paths: Vec<ArrayPath>,
    seen_paths: HashSet<(String, String)>,
}

impl<'a> ArrayTableBuilder<'a> {
    /// Create a builder for tables prefixed with `alias`.
    pub fn new(alias: &'a str, synthesizer: &'a ColumnSynthesizer<'a>) -> Self {
        Self {
            alias,
            synthesizer,
            tables: Vec::new(),
            elements: HashMap::new(),
            paths: Vec::new(),
            seen_paths: HashSet::new(),
        }
    }

    /// Register array paths, building satellites for element types not seen yet.
    pub fn add(&mut self, arrays: impl IntoIterator<Item = ArrayPath>) -> Result<()> {
        let mut queue: VecDeque<ArrayPath> = arrays.into_iter().collect();
        let mut issues = Vec::new();

        while let Some(array) = queue.pop_front() {
            let key = (array.owner.clone(), array.path.clone());
            if !self.seen_paths.insert(key) {
                continue;
            }
            self.paths.push(array.clone());

            let element_name = array.element.type_name().to_string();
            match self.elements.get(&element_name) {
                Some(existing) if *existing == array.element => continue,
                Some(existing) => {
                    issues.push(Error::NamingCollision {
                        table: array_table_name(self.alias, &element_name),
                        name: array_table_name(self.alias, &element_name),
                        first: format!("element type {existing:?}"),
                        second: format!("element type {:?}", array.element),
                    });
                    continue;
                }
                None => {}
            }

            match self.build(&array.element) {
                Ok((table, nested)) => {
                    debug!(table = %table.name, columns = table.columns.len(), "built array table");
                    self.elements.insert(element_name, array.element.clone());
                    self.tables.push(table);
                    queue.extend(nested);
                }
                Err(e) => issues.push(e),
            }
        }

        Error::from_issues(issues)
    }

    fn build(&self, element: &ArrayElement) -> Result<(MappedTable, Vec<ArrayPath>)> {
        let name = array_table_name(self.alias, element.type_name());
        let mut set = ColumnSet::new(&name);
        set.push_system(ColumnDef::instance_id())?;
        set.push_system(ColumnDef::system(
            PARENT_ID_COLUMN,
            ColumnRole::ParentInstanceId,
            SqlKind::BigInt,
        ))?;
        set.push_system(ColumnDef::system(
            PROPERTY_PATH_ID_COLUMN,
            ColumnRole::PropertyPathId,
            SqlKind::Integer,
        ))?;
        set.push_system(ColumnDef::system(
            ARRAY_INDEX_COLUMN,
            ColumnRole::ArrayIndex,
            SqlKind::Integer,
        ))?;

        let mut nested = Vec::new();
        match element {
            ArrayElement::Primitive(primitive) => {
                for column in ColumnSynthesizer::element_columns(*primitive) {
                    set.push(primitive.type_name(), column)?;
                }
            }
            ArrayElement::Struct(class) => {
                let structure = self.synthesizer.struct_def(class)?;
                let flat = self.synthesizer.flatten_class(structure)?;
                for column in flat.columns {
                    set.push(class, column)?;
                }
                nested = flat.arrays;
            }
        }

        let table = MappedTable {
            name,
            kind: TableKind::Array,
            owner: element.type_name().to_string(),
            columns: set.into_columns(),
        };
        Ok((table, nested))
    }

    /// Satellite tables in build order, and every registered array path.
    pub fn finish(self) -> (Vec<MappedTable>, Vec<ArrayPath>) {
        (self.tables, self.paths)
    }
}
