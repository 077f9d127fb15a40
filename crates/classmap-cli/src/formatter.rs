//! Output formatters for command results.

use clap::ValueEnum;
use classmap_core::migration::SchemaDiff;
use classmap_core::{CatalogEntry, DdlStatement, ImportResult, MappedTable};
use comfy_table::{Cell, Table};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format the outcome of an import.
    fn format_import(&self, result: &ImportResult) -> String;

    /// Format DDL statements.
    fn format_statements(&self, statements: &[DdlStatement]) -> String;

    /// Format a schema diff.
    fn format_diff(&self, diff: &SchemaDiff) -> String;

    /// Format the list of catalogued schemas.
    fn format_schemas(&self, schemas: &[String]) -> String;

    /// Format a catalog entry.
    fn format_entry(&self, entry: &CatalogEntry) -> String;

    /// Format one table definition.
    fn format_table(&self, table: &MappedTable) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_import(&self, result: &ImportResult) -> String {
        match result {
            ImportResult::Success(summary) => {
                let verb = if summary.dry_run { "would import" } else { "imported" };
                let mut output = format!(
                    "{} {} {} ({}): {} table(s) created, {} column(s) added, {} table(s) dropped",
                    verb,
                    summary.schema_name,
                    summary.version,
                    summary.kind,
                    summary.tables_created.len(),
                    summary.columns_added.len(),
                    summary.tables_dropped.len(),
                );
                for statement in &summary.statements {
                    output.push_str("\n\n");
                    output.push_str(statement);
                }
                output
            }
            ImportResult::Rejected { kind, diagnostics }
            | ImportResult::Failed { kind, diagnostics } => {
                let status = if matches!(result, ImportResult::Rejected { .. }) {
                    "rejected"
                } else {
                    "failed"
                };
                let mut table = Table::new();
                table.set_header(vec!["Kind", "Subject", "Message"]);
                for d in diagnostics {
                    table.add_row(vec![
                        Cell::new(d.kind),
                        Cell::new(&d.subject),
                        Cell::new(&d.message),
                    ]);
                }
                format!("import {} ({})\n{}", status, kind, table)
            }
        }
    }

    fn format_statements(&self, statements: &[DdlStatement]) -> String {
        statements
            .iter()
            .map(DdlStatement::to_sql)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn format_diff(&self, diff: &SchemaDiff) -> String {
        if diff.is_empty() {
            "No changes".to_string()
        } else {
            diff.to_string()
        }
    }

    fn format_schemas(&self, schemas: &[String]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Schema"]);

        for schema in schemas {
            table.add_row(vec![schema]);
        }

        table.to_string()
    }

    fn format_entry(&self, entry: &CatalogEntry) -> String {
        let mut classes = Table::new();
        classes.set_header(vec!["Class", "Strategy", "Table"]);
        for class in &entry.classes {
            classes.add_row(vec![
                Cell::new(&class.class),
                Cell::new(class.strategy),
                Cell::new(class.table.as_deref().unwrap_or("-")),
            ]);
        }

        let mut tables = Table::new();
        tables.set_header(vec!["Table", "Kind", "Owner", "Columns"]);
        for table in &entry.tables {
            tables.add_row(vec![
                Cell::new(&table.name),
                Cell::new(table.kind),
                Cell::new(&table.owner),
                Cell::new(table.columns.len()),
            ]);
        }

        let mut output = format!(
            "{} {} (alias {})\n{}\n{}",
            entry.schema_name, entry.version, entry.alias, classes, tables
        );
        if !entry.property_paths.is_empty() {
            let mut paths = Table::new();
            paths.set_header(vec!["Path Id", "Array Property", "Table"]);
            for path in &entry.property_paths {
                paths.add_row(vec![
                    Cell::new(path.id),
                    Cell::new(format!("{}.{}", path.owner, path.path)),
                    Cell::new(&path.table),
                ]);
            }
            output.push('\n');
            output.push_str(&paths.to_string());
        }
        output
    }

    fn format_table(&self, table: &MappedTable) -> String {
        let mut grid = Table::new();
        grid.set_header(vec!["Column", "Type", "Null", "Role", "Source"]);
        for column in &table.columns {
            grid.add_row(vec![
                Cell::new(&column.name),
                Cell::new(column.kind),
                Cell::new(if column.nullable { "yes" } else { "no" }),
                Cell::new(format!("{:?}", column.role)),
                Cell::new(column.property_path.as_deref().unwrap_or("")),
            ]);
        }
        format!("{} ({} table of {})\n{}", table.name, table.kind, table.owner, grid)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_import(&self, result: &ImportResult) -> String {
        to_json(result)
    }

    fn format_statements(&self, statements: &[DdlStatement]) -> String {
        let sql: Vec<String> = statements.iter().map(DdlStatement::to_sql).collect();
        to_json(&sql)
    }

    fn format_diff(&self, diff: &SchemaDiff) -> String {
        serde_json::json!({
            "schema": diff.schema_name,
            "from": diff.from_version.to_string(),
            "to": diff.to_version.to_string(),
            "changes": diff.change_count(),
            "report": diff.to_string(),
        })
        .to_string()
    }

    fn format_schemas(&self, schemas: &[String]) -> String {
        to_json(&schemas)
    }

    fn format_entry(&self, entry: &CatalogEntry) -> String {
        to_json(entry)
    }

    fn format_table(&self, table: &MappedTable) -> String {
        to_json(table)
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        serde_json::json!({
            "error": e.to_string()
        })
        .to_string()
    })
}
