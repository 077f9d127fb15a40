//! Import orchestration.
//!
//! [`SchemaImporter::import`] is the entry point of the engine. It validates
//! the schema, maps it, evolves it against the catalogued mapping, and executes
//! the resulting statements together with the new catalog entry as one
//! transaction on a [`MappingStore`].

use crate::ddl::DdlStatement;
use crate::error::{Diagnostic, Error, ErrorKind, Result};
use crate::mapping::{ColumnRenames, ForeignKeyNaming, SchemaMapper};
use crate::migration::{Evolver, MigrationPlan, PlanKind};
use crate::schema::{SchemaDef, SchemaVersion};
use crate::store::MappingStore;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Import options.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Column name overrides keyed by `Owner.dot.path`.
    pub renames: ColumnRenames,
    /// Foreign key column naming policy.
    pub fk_naming: ForeignKeyNaming,
    /// Map independent class groups in parallel.
    pub parallel: bool,
    /// Allow a major version change to drop and recreate every table.
    pub allow_replace: bool,
    /// Plan only; leave the store untouched.
    pub dry_run: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            renames: ColumnRenames::new(),
            fk_naming: ForeignKeyNaming::default(),
            parallel: true,
            allow_replace: false,
            dry_run: false,
        }
    }
}

impl ImportConfig {
    /// Set the rename overrides.
    pub fn with_renames(mut self, renames: ColumnRenames) -> Self {
        self.renames = renames;
        self
    }

    /// Set the foreign key naming policy.
    pub fn with_fk_naming(mut self, naming: ForeignKeyNaming) -> Self {
        self.fk_naming = naming;
        self
    }

    /// Enable or disable parallel mapping.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Allow destructive replacement on a major version change.
    pub fn with_allow_replace(mut self, allow: bool) -> Self {
        self.allow_replace = allow;
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What a successful import did (or would do, for a dry run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub schema_name: String,
    pub version: SchemaVersion,
    pub kind: PlanKind,
    pub tables_created: Vec<String>,
    /// `(table, column)` pairs.
    pub columns_added: Vec<(String, String)>,
    pub tables_dropped: Vec<String>,
    /// Rendered statements in execution order.
    pub statements: Vec<String>,
    pub dry_run: bool,
}

impl ImportSummary {
    fn from_plan(plan: &MigrationPlan, dry_run: bool) -> Self {
        Self {
            schema_name: plan.schema_name.clone(),
            version: plan.to_version,
            kind: plan.kind,
            tables_created: plan.tables_created(),
            columns_added: plan.columns_added(),
            tables_dropped: plan.tables_dropped(),
            statements: plan.statements().iter().map(DdlStatement::to_sql).collect(),
            dry_run,
        }
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportResult {
    /// Statements executed and catalog updated.
    Success(ImportSummary),
    /// The schema was refused before the store was touched.
    Rejected {
        kind: ErrorKind,
        diagnostics: Vec<Diagnostic>,
    },
    /// The store failed; nothing took effect.
    Failed {
        kind: ErrorKind,
        diagnostics: Vec<Diagnostic>,
    },
}

impl ImportResult {
    fn from_error(error: &Error) -> Self {
        let kind = error.kind();
        let diagnostics = error.diagnostics();
        match kind {
            ErrorKind::DdlExecution | ErrorKind::Storage => ImportResult::Failed { kind, diagnostics },
            _ => ImportResult::Rejected { kind, diagnostics },
        }
    }

    /// Check if the import succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ImportResult::Success(_))
    }

    /// The summary of a successful import.
    pub fn summary(&self) -> Option<&ImportSummary> {
        match self {
            ImportResult::Success(summary) => Some(summary),
            _ => None,
        }
    }

    /// Error category of a rejected or failed import.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ImportResult::Success(_) => None,
            ImportResult::Rejected { kind, .. } | ImportResult::Failed { kind, .. } => Some(*kind),
        }
    }

    /// Diagnostics of a rejected or failed import.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            ImportResult::Success(_) => &[],
            ImportResult::Rejected { diagnostics, .. } | ImportResult::Failed { diagnostics, .. } => {
                diagnostics
            }
        }
    }
}

/// Imports schemas into a store.
#[derive(Debug, Clone, Default)]
pub struct SchemaImporter {
    config: ImportConfig,
}

impl SchemaImporter {
    /// Create an importer.
    pub fn new(config: ImportConfig) -> Self {
        Self { config }
    }

    /// The importer's configuration.
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Import `schema` into `store`.
    ///
    /// All-or-nothing: on anything but success the store and its catalog are
    /// left as they were.
    #[instrument(skip_all, fields(schema = %schema.name, version = %schema.version))]
    pub fn import<S: MappingStore + ?Sized>(&self, schema: &SchemaDef, store: &mut S) -> ImportResult {
        let plan = match self.plan(schema, &*store) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "import rejected");
                return ImportResult::from_error(&e);
            }
        };

        if self.config.dry_run {
            info!(kind = %plan.kind, steps = plan.step_count(), "dry run, store untouched");
            return ImportResult::Success(ImportSummary::from_plan(&plan, true));
        }

        match self.execute(&plan, store) {
            Ok(()) => {
                info!(
                    kind = %plan.kind,
                    created = plan.tables_created().len(),
                    altered = plan.columns_added().len(),
                    dropped = plan.tables_dropped().len(),
                    "import committed"
                );
                ImportResult::Success(ImportSummary::from_plan(&plan, false))
            }
            Err(e) => {
                warn!(error = %e, "import failed");
                ImportResult::from_error(&e)
            }
        }
    }

    /// Compute the migration plan for `schema` without touching the store.
    pub fn plan<S: MappingStore + ?Sized>(&self, schema: &SchemaDef, store: &S) -> Result<MigrationPlan> {
        schema.validate()?;

        let catalogued = store.get_mapping(&schema.name)?;
        let evolver = Evolver::new().with_allow_replace(self.config.allow_replace);
        let kind = evolver.check_version(&schema.name, schema.version, catalogued.as_ref())?;
        debug!(kind = %kind, "version accepted");

        // A replaced schema is mapped from scratch.
        let recorded = match kind {
            PlanKind::Replace => None,
            _ => catalogued.as_ref(),
        };
        let mapping = SchemaMapper::new(schema)
            .with_renames(&self.config.renames)
            .with_fk_naming(self.config.fk_naming)
            .with_parallel(self.config.parallel)
            .with_validation(false)
            .with_recorded(recorded)
            .map()?;

        evolver.evolve(&mapping, catalogued.as_ref())
    }

    fn execute<S: MappingStore + ?Sized>(&self, plan: &MigrationPlan, store: &mut S) -> Result<()> {
        store.begin()?;
        match Self::apply(plan, store) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(rollback) = store.rollback() {
                    warn!(error = %rollback, "rollback failed");
                } else {
                    debug!("rolled back");
                }
                Err(e)
            }
        }
    }

    fn apply<S: MappingStore + ?Sized>(plan: &MigrationPlan, store: &mut S) -> Result<()> {
        for statement in plan.statements() {
            store.execute(&statement).map_err(|e| match e {
                e @ Error::DdlExecution { .. } => e,
                other => Error::DdlExecution {
                    statement: statement.to_sql(),
                    reason: other.to_string(),
                },
            })?;
        }
        store.put_mapping(&plan.entry)?;
        store.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClassDef, PrimitiveType, PropertyDef};
    use crate::store::SledStore;

    fn schema(version: SchemaVersion) -> SchemaDef {
        SchemaDef::new("Lab", "lb", version).with_class(
            ClassDef::entity("Sample")
                .with_property(PropertyDef::primitive("Label", PrimitiveType::String)),
        )
    }

    #[test]
    fn test_import_then_reimport() {
        let mut store = SledStore::temporary().unwrap();
        let importer = SchemaImporter::default();

        let first = importer.import(&schema(SchemaVersion::new(1, 0)), &mut store);
        let summary = first.summary().unwrap();
        assert_eq!(summary.kind, PlanKind::Create);
        assert_eq!(summary.tables_created, vec!["lb_Sample"]);
        assert!(summary.statements[0].starts_with("CREATE TABLE \"lb_Sample\""));

        let again = importer.import(&schema(SchemaVersion::new(1, 0)), &mut store);
        assert!(matches!(again, ImportResult::Rejected { .. }));
        assert_eq!(again.error_kind(), Some(ErrorKind::VersionConflict));
    }

    #[test]
    fn test_dry_run_leaves_store_untouched() {
        let mut store = SledStore::temporary().unwrap();
        let importer = SchemaImporter::new(ImportConfig::default().with_dry_run(true));

        let result = importer.import(&schema(SchemaVersion::new(1, 0)), &mut store);
        assert!(result.summary().unwrap().dry_run);
        assert!(store.get_mapping("Lab").unwrap().is_none());
        assert!(store.table("lb_Sample").unwrap().is_none());
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let mut store = SledStore::temporary().unwrap();
        let bad = schema(SchemaVersion::new(1, 0))
            .with_class(ClassDef::entity("Sample"));

        let result = SchemaImporter::default().import(&bad, &mut store);
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidSchema));
        assert!(!result.diagnostics().is_empty());
    }

    #[test]
    fn test_result_serializes_with_status() {
        let result = ImportResult::Rejected {
            kind: ErrorKind::VersionConflict,
            diagnostics: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "rejected");
    }
}
