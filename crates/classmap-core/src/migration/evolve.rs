//! Evolution of a catalogued mapping to a new schema version.

use super::plan::{MigrationPlan, MigrationStep, PlanKind};
use crate::catalog::CatalogEntry;
use crate::error::{Error, Result};
use crate::mapping::{array_table_name, ColumnDef, ColumnRole, MappedTable, SchemaMapping};
use crate::schema::SchemaVersion;
use tracing::{debug, info, instrument};

/// Computes migration plans, enforcing the version rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evolver {
    /// Allow a major version change to drop and recreate every table.
    allow_replace: bool,
}

impl Evolver {
    /// An evolver that only accepts additive changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow destructive replacement on a major version change.
    pub fn with_allow_replace(mut self, allow: bool) -> Self {
        self.allow_replace = allow;
        self
    }

    /// Decide which kind of plan an incoming version calls for.
    pub fn check_version(
        &self,
        schema_name: &str,
        incoming: SchemaVersion,
        catalogued: Option<&CatalogEntry>,
    ) -> Result<PlanKind> {
        let Some(entry) = catalogued else {
            return Ok(PlanKind::Create);
        };
        let current = entry.version;
        let conflict = || Error::VersionConflict {
            schema: schema_name.to_string(),
            catalogued: current,
            incoming,
        };

        if incoming.major == current.major {
            if incoming.minor > current.minor {
                Ok(PlanKind::Additive)
            } else {
                Err(conflict())
            }
        } else if self.allow_replace {
            Ok(PlanKind::Replace)
        } else {
            Err(conflict())
        }
    }

    /// Plan the move from the catalogued mapping to `incoming`.
    #[instrument(skip_all, fields(schema = %incoming.schema_name, version = %incoming.version))]
    pub fn evolve(
        &self,
        incoming: &SchemaMapping,
        catalogued: Option<&CatalogEntry>,
    ) -> Result<MigrationPlan> {
        let kind = self.check_version(&incoming.schema_name, incoming.version, catalogued)?;

        let (steps, entry) = match (kind, catalogued) {
            (PlanKind::Additive, Some(previous)) => Self::additive(incoming, previous)?,
            (PlanKind::Replace, Some(previous)) => {
                let mut steps: Vec<MigrationStep> = previous
                    .tables
                    .iter()
                    .rev()
                    .map(|t| MigrationStep::DropTable {
                        table: t.name.clone(),
                    })
                    .collect();
                steps.extend(incoming.tables.iter().cloned().map(MigrationStep::CreateTable));
                (steps, CatalogEntry::from_mapping(incoming, &[]))
            }
            _ => {
                let steps = incoming
                    .tables
                    .iter()
                    .cloned()
                    .map(MigrationStep::CreateTable)
                    .collect();
                (steps, CatalogEntry::from_mapping(incoming, &[]))
            }
        };

        info!(kind = %kind, steps = steps.len(), "planned migration");
        Ok(MigrationPlan {
            schema_name: incoming.schema_name.clone(),
            from_version: catalogued.map(|e| e.version),
            to_version: incoming.version,
            kind,
            steps,
            entry,
        })
    }

    fn additive(
        incoming: &SchemaMapping,
        previous: &CatalogEntry,
    ) -> Result<(Vec<MigrationStep>, CatalogEntry)> {
        let mut issues = Vec::new();

        for old in &previous.tables {
            if incoming.get_table(&old.name).is_none() {
                issues.push(Error::incompatible(&old.name, "table would be dropped"));
            }
        }

        for path in &previous.property_paths {
            let qualified = format!("{}.{}", path.owner, path.path);
            match incoming
                .array_paths
                .iter()
                .find(|p| p.owner == path.owner && p.path == path.path)
            {
                None => issues.push(Error::incompatible(qualified, "array property removed")),
                Some(p) if path.table != array_table_name(&incoming.alias, p.element.type_name()) => {
                    issues.push(Error::incompatible(
                        qualified,
                        format!("array element type changed, elements are stored in {}", path.table),
                    ))
                }
                Some(_) => {}
            }
        }

        let mut creates = Vec::new();
        let mut additions = Vec::new();
        let mut tables = Vec::with_capacity(incoming.tables.len());
        for table in &incoming.tables {
            match previous.get_table(&table.name) {
                None => {
                    debug!(table = %table.name, "new table");
                    creates.push(MigrationStep::CreateTable(table.clone()));
                    tables.push(table.clone());
                }
                Some(old) => {
                    let merged = Self::merge_table(old, table, &mut additions, &mut issues);
                    tables.push(merged);
                }
            }
        }

        Error::from_issues(issues)?;

        let mut entry = CatalogEntry::from_mapping(incoming, &previous.property_paths);
        entry.tables = tables;

        creates.extend(additions);
        Ok((creates, entry))
    }

    // Catalogued columns keep their order; new columns follow.
    fn merge_table(
        old: &MappedTable,
        new: &MappedTable,
        additions: &mut Vec<MigrationStep>,
        issues: &mut Vec<Error>,
    ) -> MappedTable {
        if old.kind != new.kind {
            issues.push(Error::incompatible(
                &old.name,
                format!("table kind changed from {} to {}", old.kind, new.kind),
            ));
        }

        for column in &old.columns {
            let subject = format!("{}.{}", old.name, column.name);
            match new.get_column(&column.name) {
                None => issues.push(Error::incompatible(subject, "column would be dropped")),
                Some(c) if c.kind != column.kind => issues.push(Error::incompatible(
                    subject,
                    format!("column retyped from {} to {}", column.kind, c.kind),
                )),
                Some(c) if c.role != column.role => issues.push(Error::incompatible(
                    subject,
                    format!("column role changed from {:?} to {:?}", column.role, c.role),
                )),
                Some(c) if !Self::same_source(column, c) => issues.push(Error::incompatible(
                    subject,
                    format!(
                        "column would change owner from {} to {}",
                        column.origin(),
                        c.origin()
                    ),
                )),
                Some(_) => {}
            }
        }

        let mut merged = old.clone();
        for column in &new.columns {
            if old.get_column(&column.name).is_some() {
                continue;
            }
            if !column.nullable {
                issues.push(Error::incompatible(
                    format!("{}.{}", new.name, column.name),
                    "cannot add a NOT NULL column to an existing table",
                ));
                continue;
            }
            debug!(table = %new.name, column = %column.name, "new column");
            additions.push(MigrationStep::AddColumn {
                table: new.name.clone(),
                column: column.clone(),
            });
            merged.columns.push(column.clone());
        }
        merged
    }

    // Sibling classes of a shared table store one relative path in one column,
    // so a property column may be recorded under any of those owners.
    fn same_source(old: &ColumnDef, new: &ColumnDef) -> bool {
        if old.property_path == new.property_path {
            return true;
        }
        let relative = |c: &ColumnDef| {
            c.property_path
                .as_deref()
                .and_then(|p| p.split_once('.'))
                .map(|(_, rest)| rest.to_string())
        };
        old.role == ColumnRole::Property
            && new.role == ColumnRole::Property
            && relative(old).is_some()
            && relative(old) == relative(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mapping::{ColumnRenames, SchemaMapper};
    use crate::schema::{
        ClassDef, PrimitiveType, PropertyDef, RelationshipClassDef, SchemaDef, StrategyHint,
    };

    fn v1() -> SchemaDef {
        SchemaDef::new("Lab", "lb", SchemaVersion::new(1, 0)).with_class(
            ClassDef::entity("Sample")
                .with_property(PropertyDef::primitive("Label", PrimitiveType::String))
                .with_property(PropertyDef::primitive_array("Readings", PrimitiveType::Double)),
        )
    }

    fn catalogued(schema: &SchemaDef) -> CatalogEntry {
        let mapping = SchemaMapper::new(schema).map().unwrap();
        Evolver::new().evolve(&mapping, None).unwrap().entry
    }

    #[test]
    fn test_fresh_import_creates_everything() {
        let schema = v1();
        let mapping = SchemaMapper::new(&schema).map().unwrap();
        let plan = Evolver::new().evolve(&mapping, None).unwrap();
        assert_eq!(plan.kind, PlanKind::Create);
        assert_eq!(plan.tables_created(), vec!["lb_Sample", "lb_ArrayOfDouble"]);
        assert_eq!(plan.entry.path_id("Sample", "Readings"), Some(1));
    }

    #[test]
    fn test_version_rules() {
        let entry = catalogued(&v1());
        let evolver = Evolver::new();

        let same = evolver.check_version("Lab", SchemaVersion::new(1, 0), Some(&entry));
        assert_eq!(same.unwrap_err().kind(), ErrorKind::VersionConflict);
        let older = evolver.check_version("Lab", SchemaVersion::new(0, 9), Some(&entry));
        assert_eq!(older.unwrap_err().kind(), ErrorKind::VersionConflict);
        let major = evolver.check_version("Lab", SchemaVersion::new(2, 0), Some(&entry));
        assert_eq!(major.unwrap_err().kind(), ErrorKind::VersionConflict);

        assert_eq!(
            evolver
                .check_version("Lab", SchemaVersion::new(1, 1), Some(&entry))
                .unwrap(),
            PlanKind::Additive
        );
        assert_eq!(
            evolver
                .with_allow_replace(true)
                .check_version("Lab", SchemaVersion::new(2, 0), Some(&entry))
                .unwrap(),
            PlanKind::Replace
        );
    }

    #[test]
    fn test_additive_plan() {
        let entry = catalogued(&v1());
        let mut next = v1().with_version(SchemaVersion::new(1, 1));
        next.classes[0]
            .properties
            .push(PropertyDef::primitive("Mass", PrimitiveType::Double));
        next.classes[0]
            .properties
            .push(PropertyDef::primitive_array("Notes", PrimitiveType::String));
        next = next.with_class(ClassDef::entity("Batch"));

        let mapping = SchemaMapper::new(&next).map().unwrap();
        let plan = Evolver::new().evolve(&mapping, Some(&entry)).unwrap();

        assert_eq!(plan.kind, PlanKind::Additive);
        assert_eq!(plan.tables_created(), vec!["lb_Batch", "lb_ArrayOfString"]);
        assert_eq!(
            plan.columns_added(),
            vec![("lb_Sample".to_string(), "Mass".to_string())]
        );
        // Creations precede alterations.
        assert!(matches!(plan.steps.last(), Some(MigrationStep::AddColumn { .. })));

        assert_eq!(plan.entry.path_id("Sample", "Readings"), Some(1));
        assert_eq!(plan.entry.path_id("Sample", "Notes"), Some(2));
        assert_eq!(
            plan.entry.get_table("lb_Sample").unwrap().column_names(),
            vec!["ECInstanceId", "Label", "Mass"]
        );
    }

    #[test]
    fn test_regressions_report_each_construct() {
        let entry = catalogued(&v1());
        let mut next = v1().with_version(SchemaVersion::new(1, 1));
        next.classes[0].properties = vec![PropertyDef::primitive("Label", PrimitiveType::Int32)];

        let mapping = SchemaMapper::new(&next).map().unwrap();
        let err = Evolver::new().evolve(&mapping, Some(&entry)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleChange);

        let subjects: Vec<_> = err.diagnostics().into_iter().map(|d| d.subject).collect();
        assert_eq!(
            subjects,
            vec!["lb_ArrayOfDouble", "Sample.Readings", "lb_Sample.Label"]
        );
    }

    #[test]
    fn test_renamed_column_cannot_change_property() {
        let schema = SchemaDef::new("Lab", "lb", SchemaVersion::new(1, 0)).with_class(
            ClassDef::entity("Sample").with_property(PropertyDef::primitive("x", PrimitiveType::Double)),
        );
        let renames = ColumnRenames::new().with("Sample.x", "Val");
        let mapping = SchemaMapper::new(&schema).with_renames(&renames).map().unwrap();
        let entry = Evolver::new().evolve(&mapping, None).unwrap().entry;

        // `Val` now stores `y`, and `x` would get a fresh column.
        let mut next = schema.clone().with_version(SchemaVersion::new(1, 1));
        next.classes[0]
            .properties
            .push(PropertyDef::primitive("y", PrimitiveType::Double));
        let renames = ColumnRenames::new().with("Sample.y", "Val");
        let mapping = SchemaMapper::new(&next)
            .with_renames(&renames)
            .with_recorded(Some(&entry))
            .map()
            .unwrap();

        let err = Evolver::new().evolve(&mapping, Some(&entry)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleChange);
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].subject, "lb_Sample.Val");
        assert!(diagnostics[0].message.contains("property Sample.x"));
        assert!(diagnostics[0].message.contains("property Sample.y"));
    }

    fn hr_schema(version: SchemaVersion, relationships: &[&str]) -> SchemaDef {
        let mut schema = SchemaDef::new("Hr", "hr", version)
            .with_class(ClassDef::entity("Company"))
            .with_class(ClassDef::entity("Employee"));
        for name in relationships {
            schema = schema.with_relationship(RelationshipClassDef::one_to_many(
                *name, "Company", "Employee",
            ));
        }
        schema
    }

    #[test]
    fn test_foreign_key_cannot_change_relationship() {
        let entry = catalogued(&hr_schema(SchemaVersion::new(1, 0), &["Employs"]));
        let next = hr_schema(SchemaVersion::new(1, 1), &["Audits", "Employs"]);

        // Numbered from declaration order alone, `Audits` takes `CompanyId`.
        let renumbered = SchemaMapper::new(&next).map().unwrap();
        let err = Evolver::new().evolve(&renumbered, Some(&entry)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleChange);
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics[0].subject, "hr_Employee.CompanyId");
        assert!(diagnostics[0].message.contains("relationship Employs"));

        // Held to the catalogued keys, the new relationship gets the next ordinal.
        let mapping = SchemaMapper::new(&next).with_recorded(Some(&entry)).map().unwrap();
        let plan = Evolver::new().evolve(&mapping, Some(&entry)).unwrap();
        assert_eq!(plan.kind, PlanKind::Additive);
        assert_eq!(
            plan.columns_added(),
            vec![("hr_Employee".to_string(), "CompanyId_2".to_string())]
        );
        let employee = plan.entry.get_table("hr_Employee").unwrap();
        assert_eq!(
            employee.get_column("CompanyId").unwrap().property_path.as_deref(),
            Some("Employs")
        );
        assert_eq!(
            employee.get_column("CompanyId_2").unwrap().property_path.as_deref(),
            Some("Audits")
        );
    }

    #[test]
    fn test_shared_column_may_be_recorded_under_a_sibling() {
        let shared = || {
            SchemaDef::new("Store", "sc", SchemaVersion::new(1, 0))
                .with_class(
                    ClassDef::entity("Furniture").with_strategy(StrategyHint::SharedHierarchyTable),
                )
                .with_class(
                    ClassDef::entity("Desk")
                        .with_base("Furniture")
                        .with_property(PropertyDef::primitive("Color", PrimitiveType::String)),
                )
        };
        let entry = catalogued(&shared());

        // A sibling declared first now contributes the shared `Color` column.
        let mut next = shared().with_version(SchemaVersion::new(1, 1));
        next.classes.insert(
            1,
            ClassDef::entity("Lamp")
                .with_base("Furniture")
                .with_property(PropertyDef::primitive("Color", PrimitiveType::String)),
        );
        let mapping = SchemaMapper::new(&next).with_recorded(Some(&entry)).map().unwrap();
        let plan = Evolver::new().evolve(&mapping, Some(&entry)).unwrap();
        assert_eq!(plan.kind, PlanKind::Additive);
        assert!(plan.columns_added().is_empty());
    }

    #[test]
    fn test_replace_plan_drops_then_creates() {
        let entry = catalogued(&v1());
        let next = v1().with_version(SchemaVersion::new(2, 0));
        let mapping = SchemaMapper::new(&next).map().unwrap();
        let plan = Evolver::new()
            .with_allow_replace(true)
            .evolve(&mapping, Some(&entry))
            .unwrap();
        assert_eq!(plan.kind, PlanKind::Replace);
        assert_eq!(plan.tables_dropped(), vec!["lb_ArrayOfDouble", "lb_Sample"]);
        assert_eq!(plan.tables_created().len(), 2);
        assert!(matches!(plan.steps[0], MigrationStep::DropTable { .. }));
    }
}
