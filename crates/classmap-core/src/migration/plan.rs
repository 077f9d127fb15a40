//! Migration plans.

use crate::catalog::CatalogEntry;
use crate::ddl::DdlStatement;
use crate::mapping::{ColumnDef, MappedTable};
use crate::schema::SchemaVersion;
use serde::Serialize;
use std::fmt;

/// How the plan relates to the catalogued mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanKind {
    /// Nothing catalogued yet: create everything.
    Create,
    /// Same major, higher minor: add tables and columns.
    Additive,
    /// Major change with replace allowed: drop and recreate.
    Replace,
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanKind::Create => write!(f, "create"),
            PlanKind::Additive => write!(f, "additive"),
            PlanKind::Replace => write!(f, "replace"),
        }
    }
}

/// One schema change against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// Drop a catalogued table.
    DropTable { table: String },
    /// Create a table.
    CreateTable(MappedTable),
    /// Append a column to an existing table.
    AddColumn { table: String, column: ColumnDef },
}

impl MigrationStep {
    /// The table this step touches.
    pub fn table_name(&self) -> &str {
        match self {
            MigrationStep::DropTable { table } | MigrationStep::AddColumn { table, .. } => table,
            MigrationStep::CreateTable(t) => &t.name,
        }
    }

    /// The statement executing this step.
    pub fn to_statement(&self) -> DdlStatement {
        match self {
            MigrationStep::DropTable { table } => DdlStatement::DropTable {
                table: table.clone(),
            },
            MigrationStep::CreateTable(table) => DdlStatement::CreateTable(table.clone()),
            MigrationStep::AddColumn { table, column } => DdlStatement::AddColumn {
                table: table.clone(),
                column: column.clone(),
            },
        }
    }
}

/// A complete migration plan for one schema.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Schema name.
    pub schema_name: String,
    /// Catalogued version, if any.
    pub from_version: Option<SchemaVersion>,
    /// Incoming version.
    pub to_version: SchemaVersion,
    /// Plan kind.
    pub kind: PlanKind,
    /// Ordered steps: drops, then creations, then column additions.
    pub steps: Vec<MigrationStep>,
    /// Catalog entry to record once the steps succeed.
    pub entry: CatalogEntry,
}

impl MigrationPlan {
    /// Get the number of steps in the plan.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Check if this plan changes no table.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of created tables.
    pub fn tables_created(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                MigrationStep::CreateTable(t) => Some(t.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(table, column)` pairs of added columns.
    pub fn columns_added(&self) -> Vec<(String, String)> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                MigrationStep::AddColumn { table, column } => {
                    Some((table.clone(), column.name.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Names of dropped tables.
    pub fn tables_dropped(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                MigrationStep::DropTable { table } => Some(table.clone()),
                _ => None,
            })
            .collect()
    }

    /// Statements in execution order.
    pub fn statements(&self) -> Vec<DdlStatement> {
        self.steps.iter().map(MigrationStep::to_statement).collect()
    }
}
