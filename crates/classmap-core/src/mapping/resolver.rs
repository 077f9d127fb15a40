//! Per-class mapping strategy resolution.

use super::naming::class_table_name;
use crate::catalog::CatalogEntry;
use crate::error::{Error, Result};
use crate::schema::{ClassDef, ClassKind, SchemaDef, StrategyHint};
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// How a class is stored.
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
pub enum MappingStrategy {
    /// One table for a whole hierarchy, rows told apart by `ECClassId`.
    SharedHierarchyTable,
    /// A table per class holding inherited and own properties.
    OwnTablePerClass,
    /// Flattened into the owner's table (structs).
    EmbeddedInOwner,
    /// Not stored.
    NotMapped,
}

impl fmt::Display for MappingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MappingStrategy::SharedHierarchyTable => "SharedHierarchyTable",
            MappingStrategy::OwnTablePerClass => "OwnTablePerClass",
            MappingStrategy::EmbeddedInOwner => "EmbeddedInOwner",
            MappingStrategy::NotMapped => "NotMapped",
        };
        f.write_str(name)
    }
}

/// A class's resolved strategy, as recorded in the catalog.
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
pub struct ClassMapping {
    /// Class name.
    pub class: String,
    /// Resolved strategy.
    pub strategy: MappingStrategy,
    /// Table holding the class's rows, if stored in one.
    pub table: Option<String>,
}

/// Output of strategy resolution for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStrategy {
    /// Strategy the class is stored with.
    pub strategy: MappingStrategy,
    /// Table holding the class's rows.
    pub table: Option<String>,
    /// Class whose table this is (the class itself for own tables and shared roots).
    pub table_owner: Option<String>,
}

impl ResolvedStrategy {
    fn own(table: String, class: &str) -> Self {
        Self {
            strategy: MappingStrategy::OwnTablePerClass,
            table: Some(table),
            table_owner: Some(class.to_string()),
        }
    }

    fn shared(table: String, root: &str) -> Self {
        Self {
            strategy: MappingStrategy::SharedHierarchyTable,
            table: Some(table),
            table_owner: Some(root.to_string()),
        }
    }

    fn tableless(strategy: MappingStrategy) -> Self {
        Self {
            strategy,
            table: None,
            table_owner: None,
        }
    }

    /// Check if the class owns the table it is stored in.
    pub fn owns_table(&self, class: &str) -> bool {
        self.table_owner.as_deref() == Some(class)
    }

    /// Check if the class is stored in a table.
    pub fn is_stored(&self) -> bool {
        self.table.is_some()
    }
}

/// Resolves strategies for the classes of one schema.
///
/// Results are memoized, so resolving a subclass resolves each ancestor once.
pub struct StrategyResolver<'a> {
    schema: &'a SchemaDef,
    recorded: Option<&'a CatalogEntry>,
    resolved: HashMap<String, ResolvedStrategy>,
    in_progress: HashSet<String>,
}

impl<'a> StrategyResolver<'a> {
    /// Create a resolver; `recorded` is the catalogued mapping of this schema, if any.
    pub fn new(schema: &'a SchemaDef, recorded: Option<&'a CatalogEntry>) -> Self {
        Self {
            schema,
            recorded,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Resolve a class's strategy.
    pub fn resolve(&mut self, class_name: &str) -> Result<ResolvedStrategy> {
        if let Some(resolved) = self.resolved.get(class_name) {
            return Ok(resolved.clone());
        }
        if !self.in_progress.insert(class_name.to_string()) {
            return Err(Error::invalid(class_name, "inheritance cycle"));
        }

        let result = self.resolve_uncached(class_name);
        self.in_progress.remove(class_name);
        let resolved = result?;

        debug!(
            class = class_name,
            strategy = %resolved.strategy,
            table = resolved.table.as_deref().unwrap_or("-"),
            "resolved mapping strategy"
        );
        self.resolved
            .insert(class_name.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn resolve_uncached(&mut self, class_name: &str) -> Result<ResolvedStrategy> {
        let schema = self.schema;
        let class = schema
            .get_class(class_name)
            .ok_or_else(|| Error::invalid(class_name, "class is not defined"))?;

        let resolved = match class.kind {
            ClassKind::Struct => ResolvedStrategy::tableless(MappingStrategy::EmbeddedInOwner),
            ClassKind::CustomAttribute => ResolvedStrategy::tableless(MappingStrategy::NotMapped),
            ClassKind::Entity => self.resolve_entity(class)?,
        };
        self.check_recorded(class, &resolved)?;
        Ok(resolved)
    }

    fn resolve_entity(&mut self, class: &ClassDef) -> Result<ResolvedStrategy> {
        let own_table = class_table_name(&self.schema.alias, &class.name);

        let Some(base_name) = class.base.as_deref() else {
            return Ok(match class.strategy {
                None | Some(StrategyHint::OwnTablePerClass) => {
                    ResolvedStrategy::own(own_table, &class.name)
                }
                Some(StrategyHint::SharedHierarchyTable) => {
                    ResolvedStrategy::shared(own_table, &class.name)
                }
                Some(StrategyHint::NotMapped) => {
                    ResolvedStrategy::tableless(MappingStrategy::NotMapped)
                }
            });
        };

        let base_kind = self.schema.get_class(base_name).map(|b| b.kind);
        if base_kind != Some(ClassKind::Entity) {
            return Err(Error::invalid(
                &class.name,
                format!("base class {base_name} is not an entity"),
            ));
        }
        let base = self.resolve(base_name)?;

        match (base.strategy, class.strategy) {
            (MappingStrategy::NotMapped, None | Some(StrategyHint::NotMapped)) => {
                Ok(ResolvedStrategy::tableless(MappingStrategy::NotMapped))
            }
            (MappingStrategy::NotMapped, Some(hint)) => Err(Error::strategy_conflict(
                &class.name,
                format!("base class {base_name} is NotMapped, {hint:?} cannot be requested below it"),
            )),
            (
                MappingStrategy::SharedHierarchyTable,
                None | Some(StrategyHint::SharedHierarchyTable),
            ) => match (base.table, base.table_owner) {
                (Some(table), Some(root)) => Ok(ResolvedStrategy::shared(table, &root)),
                _ => Err(Error::invalid(&class.name, "shared base has no table")),
            },
            (MappingStrategy::SharedHierarchyTable, Some(StrategyHint::OwnTablePerClass)) => {
                if let Some(recorded) = self.recorded.and_then(|e| e.class(&class.name)) {
                    if recorded.strategy == MappingStrategy::SharedHierarchyTable {
                        return Err(Error::strategy_conflict(
                            &class.name,
                            format!(
                                "already stored in shared table {}, cannot opt out",
                                recorded.table.as_deref().unwrap_or("?")
                            ),
                        ));
                    }
                }
                Ok(ResolvedStrategy::own(own_table, &class.name))
            }
            (MappingStrategy::SharedHierarchyTable, Some(StrategyHint::NotMapped))
            | (MappingStrategy::OwnTablePerClass, Some(StrategyHint::NotMapped)) => {
                Err(Error::strategy_conflict(
                    &class.name,
                    format!("cannot be NotMapped below mapped base class {base_name}"),
                ))
            }
            (MappingStrategy::OwnTablePerClass, None | Some(StrategyHint::OwnTablePerClass)) => {
                Ok(ResolvedStrategy::own(own_table, &class.name))
            }
            (MappingStrategy::OwnTablePerClass, Some(StrategyHint::SharedHierarchyTable)) => {
                Err(Error::strategy_conflict(
                    &class.name,
                    format!("requests SharedHierarchyTable but base class {base_name} does not use it"),
                ))
            }
            (MappingStrategy::EmbeddedInOwner, _) => Err(Error::invalid(
                &class.name,
                format!("base class {base_name} is a struct"),
            )),
        }
    }

    fn check_recorded(&self, class: &ClassDef, resolved: &ResolvedStrategy) -> Result<()> {
        let Some(recorded) = self.recorded.and_then(|e| e.class(&class.name)) else {
            return Ok(());
        };
        if recorded.strategy != resolved.strategy || recorded.table != resolved.table {
            return Err(Error::strategy_conflict(
                &class.name,
                format!(
                    "recorded as {} in {}, now resolves to {} in {}",
                    recorded.strategy,
                    recorded.table.as_deref().unwrap_or("no table"),
                    resolved.strategy,
                    resolved.table.as_deref().unwrap_or("no table"),
                ),
            ));
        }
        Ok(())
    }

    /// Consume the resolver, returning every resolved class.
    pub fn into_resolved(self) -> HashMap<String, ResolvedStrategy> {
        self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::SchemaVersion;

    fn schema() -> SchemaDef {
        SchemaDef::new("Store", "sc", SchemaVersion::new(1, 0))
            .with_class(ClassDef::entity("Asset"))
            .with_class(
                ClassDef::entity("Furniture")
                    .with_base("Asset")
                    .with_strategy(StrategyHint::SharedHierarchyTable),
            )
            .with_class(ClassDef::entity("Chair").with_base("Furniture"))
            .with_class(
                ClassDef::entity("Stool")
                    .with_base("Chair")
                    .with_strategy(StrategyHint::OwnTablePerClass),
            )
            .with_class(ClassDef::entity("Bench").with_base("Stool"))
            .with_class(ClassDef::structure("Pt"))
            .with_class(ClassDef::custom_attribute("Note"))
            .with_class(ClassDef::entity("Ghost").with_strategy(StrategyHint::NotMapped))
            .with_class(ClassDef::entity("Spirit").with_base("Ghost"))
    }

    #[test]
    fn test_resolve_defaults() {
        let schema = schema();
        let mut resolver = StrategyResolver::new(&schema, None);

        let asset = resolver.resolve("Asset").unwrap();
        assert_eq!(asset.strategy, MappingStrategy::OwnTablePerClass);
        assert_eq!(asset.table.as_deref(), Some("sc_Asset"));

        assert_eq!(
            resolver.resolve("Pt").unwrap().strategy,
            MappingStrategy::EmbeddedInOwner
        );
        assert_eq!(resolver.resolve("Note").unwrap().strategy, MappingStrategy::NotMapped);
    }

    #[test]
    fn test_shared_hierarchy_and_opt_out() {
        let schema = schema();
        let mut resolver = StrategyResolver::new(&schema, None);

        let chair = resolver.resolve("Chair").unwrap();
        assert_eq!(chair.strategy, MappingStrategy::SharedHierarchyTable);
        assert_eq!(chair.table.as_deref(), Some("sc_Furniture"));
        assert!(!chair.owns_table("Chair"));
        assert!(resolver.resolve("Furniture").unwrap().owns_table("Furniture"));

        let stool = resolver.resolve("Stool").unwrap();
        assert_eq!(stool.strategy, MappingStrategy::OwnTablePerClass);
        assert_eq!(stool.table.as_deref(), Some("sc_Stool"));

        let bench = resolver.resolve("Bench").unwrap();
        assert_eq!(bench.strategy, MappingStrategy::OwnTablePerClass);
        assert_eq!(bench.table.as_deref(), Some("sc_Bench"));
    }

    #[test]
    fn test_not_mapped_propagates() {
        let schema = schema();
        let mut resolver = StrategyResolver::new(&schema, None);
        assert_eq!(
            resolver.resolve("Spirit").unwrap().strategy,
            MappingStrategy::NotMapped
        );
    }

    #[test]
    fn test_shared_below_own_is_conflict() {
        let schema = schema().with_class(
            ClassDef::entity("Gadget")
                .with_base("Asset")
                .with_strategy(StrategyHint::SharedHierarchyTable),
        );
        let mut resolver = StrategyResolver::new(&schema, None);
        let err = resolver.resolve("Gadget").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MappingStrategyConflict);
    }

    #[test]
    fn test_recorded_strategy_must_hold() {
        let before = schema();
        let entry = CatalogEntry::for_test(&before, vec![ClassMapping {
            class: "Stool".into(),
            strategy: MappingStrategy::SharedHierarchyTable,
            table: Some("sc_Furniture".into()),
        }]);

        let mut resolver = StrategyResolver::new(&before, Some(&entry));
        let err = resolver.resolve("Stool").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MappingStrategyConflict);
        assert!(err.to_string().contains("cannot opt out"));

        // Unrecorded classes resolve normally.
        assert!(resolver.resolve("Asset").is_ok());
    }

    #[test]
    fn test_recorded_root_strategy_must_hold() {
        let schema = schema();
        let entry = CatalogEntry::for_test(&schema, vec![ClassMapping {
            class: "Asset".into(),
            strategy: MappingStrategy::SharedHierarchyTable,
            table: Some("sc_Asset".into()),
        }]);

        let mut resolver = StrategyResolver::new(&schema, Some(&entry));
        let err = resolver.resolve("Asset").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MappingStrategyConflict);
        assert!(err.to_string().contains("recorded as"));
    }

    #[test]
    fn test_unknown_and_cyclic() {
        let schema = SchemaDef::new("S", "s", SchemaVersion::new(1, 0))
            .with_class(ClassDef::entity("A").with_base("B"))
            .with_class(ClassDef::entity("B").with_base("A"));
        let mut resolver = StrategyResolver::new(&schema, None);
        assert_eq!(resolver.resolve("A").unwrap_err().kind(), ErrorKind::InvalidSchema);
        assert_eq!(resolver.resolve("Zed").unwrap_err().kind(), ErrorKind::InvalidSchema);
    }
}
