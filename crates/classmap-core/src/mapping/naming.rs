//! Table and column naming rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Table of a class: `<alias>_<Class>`.
pub fn class_table_name(alias: &str, class: &str) -> String {
    format!("{alias}_{class}")
}

/// Satellite table of an element type: `<alias>_ArrayOf<Element>`.
pub fn array_table_name(alias: &str, element: &str) -> String {
    format!("{alias}_ArrayOf{element}")
}

/// Link table of a relationship: `<alias>_<Relationship>`.
pub fn link_table_name(alias: &str, relationship: &str) -> String {
    format!("{alias}_{relationship}")
}

/// Dot-joined property path.
pub(crate) fn join_path(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_string(),
    }
}

/// Underscore-joined column name.
pub(crate) fn join_name(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}_{name}"),
        None => name.to_string(),
    }
}

/// Column name overrides keyed by `Owner.dot.path`.
///
/// An override replaces the name prefix at its path, so a renamed struct
/// property renames every column flattened from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnRenames {
    overrides: BTreeMap<String, String>,
}

impl ColumnRenames {
    /// No overrides.
    pub const fn new() -> Self {
        Self {
            overrides: BTreeMap::new(),
        }
    }

    /// Add an override for `Owner.dot.path`.
    pub fn with(mut self, path: impl Into<String>, column: impl Into<String>) -> Self {
        self.overrides.insert(path.into(), column.into());
        self
    }

    /// Add an override in place.
    pub fn insert(&mut self, path: impl Into<String>, column: impl Into<String>) {
        self.overrides.insert(path.into(), column.into());
    }

    /// Override for a property path of an owner class.
    pub fn get(&self, owner: &str, path: &str) -> Option<&str> {
        self.overrides
            .get(&format!("{owner}.{path}"))
            .map(String::as_str)
    }

    /// Number of overrides.
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Check if there are no overrides.
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Which end of a relationship a referenced class sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndRole {
    Source,
    Target,
}

/// Naming policy for foreign key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForeignKeyNaming {
    /// `<Class>Id`, then `<Class>Id_2`, `<Class>Id_3`, ...
    #[default]
    Ordinal,
    /// `<Class>__src_01_id` / `<Class>__trg_01_id`.
    EndpointSuffixed,
}

impl ForeignKeyNaming {
    /// Column name for the `ordinal`-th (1-based) key to `class` in one table.
    pub fn column_name(&self, class: &str, end: EndRole, ordinal: u32) -> String {
        match self {
            ForeignKeyNaming::Ordinal if ordinal <= 1 => format!("{class}Id"),
            ForeignKeyNaming::Ordinal => format!("{class}Id_{ordinal}"),
            ForeignKeyNaming::EndpointSuffixed => {
                let end = match end {
                    EndRole::Source => "src",
                    EndRole::Target => "trg",
                };
                format!("{class}__{end}_{ordinal:02}_id")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(class_table_name("sc", "Chair"), "sc_Chair");
        assert_eq!(array_table_name("os", "OrderedStruct"), "os_ArrayOfOrderedStruct");
        assert_eq!(link_table_name("sc", "Owns"), "sc_Owns");
    }

    #[test]
    fn test_renames() {
        let renames = ColumnRenames::new().with("Owner.o", "Origin");
        assert_eq!(renames.get("Owner", "o"), Some("Origin"));
        assert_eq!(renames.get("Other", "o"), None);
        assert_eq!(renames.len(), 1);
    }

    #[test]
    fn test_fk_naming() {
        let ordinal = ForeignKeyNaming::Ordinal;
        assert_eq!(ordinal.column_name("Company", EndRole::Source, 1), "CompanyId");
        assert_eq!(ordinal.column_name("Company", EndRole::Source, 2), "CompanyId_2");

        let suffixed = ForeignKeyNaming::EndpointSuffixed;
        assert_eq!(
            suffixed.column_name("Employee", EndRole::Source, 1),
            "Employee__src_01_id"
        );
        assert_eq!(
            suffixed.column_name("Company", EndRole::Target, 11),
            "Company__trg_11_id"
        );
    }
}
