//! DDL statements.

use crate::mapping::{ColumnDef, MappedTable, INSTANCE_ID_COLUMN};
use std::fmt;

/// A schema-changing statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    /// `CREATE TABLE` with every column in physical order.
    CreateTable(MappedTable),
    /// `ALTER TABLE ... ADD COLUMN`.
    AddColumn { table: String, column: ColumnDef },
    /// `DROP TABLE`.
    DropTable { table: String },
}

impl DdlStatement {
    /// The table this statement touches.
    pub fn table_name(&self) -> &str {
        match self {
            DdlStatement::CreateTable(t) => &t.name,
            DdlStatement::AddColumn { table, .. } | DdlStatement::DropTable { table } => table,
        }
    }

    /// Render as SQL text.
    pub fn to_sql(&self) -> String {
        match self {
            DdlStatement::CreateTable(table) => {
                let mut lines: Vec<String> = table.columns.iter().map(column_sql).collect();
                if table.get_column(INSTANCE_ID_COLUMN).is_some() {
                    lines.push(format!("PRIMARY KEY ({})", quote(INSTANCE_ID_COLUMN)));
                }
                format!(
                    "CREATE TABLE {} (\n    {}\n);",
                    quote(&table.name),
                    lines.join(",\n    ")
                )
            }
            DdlStatement::AddColumn { table, column } => {
                format!("ALTER TABLE {} ADD COLUMN {};", quote(table), column_sql(column))
            }
            DdlStatement::DropTable { table } => format!("DROP TABLE {};", quote(table)),
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Double-quote an identifier.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_sql(column: &ColumnDef) -> String {
    if column.nullable {
        format!("{} {}", quote(&column.name), column.kind)
    } else {
        format!("{} {} NOT NULL", quote(&column.name), column.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ColumnRole, SqlKind, TableKind, CLASS_ID_COLUMN};

    fn table() -> MappedTable {
        MappedTable::new("lb_Sample", TableKind::Class, "Sample")
            .with_column(ColumnDef::instance_id())
            .with_column(ColumnDef::system(
                CLASS_ID_COLUMN,
                ColumnRole::ClassId,
                SqlKind::BigInt,
            ))
            .with_column(ColumnDef::property("Label", "Label", SqlKind::Text))
    }

    #[test]
    fn test_create_table_sql() {
        let sql = DdlStatement::CreateTable(table()).to_sql();
        assert_eq!(
            sql,
            "CREATE TABLE \"lb_Sample\" (\n    \"ECInstanceId\" BIGINT NOT NULL,\n    \"ECClassId\" BIGINT NOT NULL,\n    \"Label\" TEXT,\n    PRIMARY KEY (\"ECInstanceId\")\n);"
        );
    }

    #[test]
    fn test_add_and_drop_sql() {
        let add = DdlStatement::AddColumn {
            table: "lb_Sample".into(),
            column: ColumnDef::property("Mass", "Mass", SqlKind::Real),
        };
        assert_eq!(add.to_sql(), "ALTER TABLE \"lb_Sample\" ADD COLUMN \"Mass\" REAL;");
        assert_eq!(add.table_name(), "lb_Sample");

        let drop = DdlStatement::DropTable {
            table: "lb_Sample".into(),
        };
        assert_eq!(drop.to_string(), "DROP TABLE \"lb_Sample\";");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
