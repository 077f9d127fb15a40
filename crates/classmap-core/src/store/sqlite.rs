//! Table store executing DDL against SQLite.

use super::{
    check_identifier, decode_table, encode_table, rejected, MappingStore, DEFAULT_MAX_IDENTIFIER_LEN,
};
use crate::catalog::CatalogEntry;
use crate::ddl::{quote, DdlStatement};
use crate::error::{Error, Result};
use crate::mapping::{ColumnDef, MappedTable};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, instrument};

/// Table holding catalog entries.
pub const CATALOG_TABLE: &str = "classmap_catalog";

/// Table holding the definitions of mapped tables.
pub const TABLE_REGISTRY: &str = "classmap_tables";

/// A [`MappingStore`] that executes the rendered DDL on a SQLite connection.
pub struct SqliteStore {
    conn: Connection,
    max_identifier_len: usize,
    in_transaction: bool,
}

impl SqliteStore {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Use an already opened connection.
    pub fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {CATALOG_TABLE} (
                schema_name TEXT PRIMARY KEY,
                version TEXT NOT NULL,
                entry BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {TABLE_REGISTRY} (
                name TEXT PRIMARY KEY,
                definition BLOB NOT NULL
            );"
        ))?;
        Ok(Self {
            conn,
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
            in_transaction: false,
        })
    }

    /// Set the identifier length limit.
    pub fn with_max_identifier_len(mut self, len: usize) -> Self {
        self.max_identifier_len = len;
        self
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn require_transaction(&self, statement: &DdlStatement) -> Result<()> {
        if self.in_transaction {
            Ok(())
        } else {
            Err(rejected(statement, "no transaction in progress"))
        }
    }

    fn register(&self, table: &MappedTable) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {TABLE_REGISTRY} (name, definition) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET definition = excluded.definition"
            ),
            params![table.name, encode_table(table)?],
        )?;
        Ok(())
    }
}

impl MappingStore for SqliteStore {
    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        Ok(())
    }

    fn create_table(&mut self, table: &MappedTable) -> Result<()> {
        let statement = DdlStatement::CreateTable(table.clone());
        self.require_transaction(&statement)?;
        check_identifier(&statement, &table.name, self.max_identifier_len)?;
        for column in &table.columns {
            check_identifier(&statement, &column.name, self.max_identifier_len)?;
        }

        debug!(table = %table.name, "creating table");
        self.conn.execute_batch(&statement.to_sql())?;
        self.register(table)
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<()> {
        let statement = DdlStatement::AddColumn {
            table: table.to_string(),
            column: column.clone(),
        };
        self.require_transaction(&statement)?;
        check_identifier(&statement, &column.name, self.max_identifier_len)?;

        let mut definition = self
            .table(table)?
            .ok_or_else(|| rejected(&statement, format!("no such table: {table}")))?;

        debug!(table = %table, column = %column.name, "adding column");
        self.conn.execute_batch(&statement.to_sql())?;
        definition.columns.push(column.clone());
        self.register(&definition)
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        let statement = DdlStatement::DropTable {
            table: table.to_string(),
        };
        self.require_transaction(&statement)?;

        debug!(table = %table, "dropping table");
        self.conn.execute_batch(&statement.to_sql())?;
        self.conn.execute(
            &format!("DELETE FROM {TABLE_REGISTRY} WHERE name = ?1"),
            params![table],
        )?;
        Ok(())
    }

    fn put_mapping(&mut self, entry: &CatalogEntry) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::DdlExecution {
                statement: format!("INSERT INTO {}", quote(CATALOG_TABLE)),
                reason: "no transaction in progress".to_string(),
            });
        }
        self.conn.execute(
            &format!(
                "INSERT INTO {CATALOG_TABLE} (schema_name, version, entry) VALUES (?1, ?2, ?3)
                 ON CONFLICT(schema_name) DO UPDATE SET
                     version = excluded.version,
                     entry = excluded.entry"
            ),
            params![entry.schema_name, entry.version.to_string(), entry.to_bytes()?],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn get_mapping(&self, schema: &str) -> Result<Option<CatalogEntry>> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                &format!("SELECT entry FROM {CATALOG_TABLE} WHERE schema_name = ?1"),
                params![schema],
                |row| row.get(0),
            )
            .optional()?;
        bytes.map(|b| CatalogEntry::from_bytes(&b)).transpose()
    }

    fn list_schemas(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT schema_name FROM {CATALOG_TABLE} ORDER BY schema_name"
        ))?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn table(&self, name: &str) -> Result<Option<MappedTable>> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                &format!("SELECT definition FROM {TABLE_REGISTRY} WHERE name = ?1"),
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        bytes.map(|b| decode_table(&b)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mapping::{SqlKind, TableKind};
    use crate::schema::SchemaVersion;

    fn table() -> MappedTable {
        MappedTable::new("lb_Sample", TableKind::Class, "Sample")
            .with_column(ColumnDef::instance_id())
            .with_column(ColumnDef::property("Label", "Label", SqlKind::Text))
    }

    fn entry() -> CatalogEntry {
        CatalogEntry {
            schema_name: "Lab".into(),
            alias: "lb".into(),
            version: SchemaVersion::new(1, 0),
            classes: Vec::new(),
            tables: vec![table()],
            relationships: Vec::new(),
            property_paths: Vec::new(),
            imported_at: 0,
        }
    }

    fn sqlite_columns(store: &SqliteStore, table: &str) -> Vec<String> {
        let mut stmt = store
            .connection()
            .prepare(&format!("PRAGMA table_info({})", quote(table)))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_commit_creates_real_tables() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.begin().unwrap();
        store.create_table(&table()).unwrap();
        store
            .add_column("lb_Sample", &ColumnDef::property("Mass", "Mass", SqlKind::Real))
            .unwrap();
        store.put_mapping(&entry()).unwrap();
        store.commit().unwrap();

        assert_eq!(
            sqlite_columns(&store, "lb_Sample"),
            vec!["ECInstanceId", "Label", "Mass"]
        );
        assert_eq!(
            store.table("lb_Sample").unwrap().unwrap().column_names(),
            vec!["ECInstanceId", "Label", "Mass"]
        );
        assert_eq!(store.list_schemas().unwrap(), vec!["Lab".to_string()]);
        assert_eq!(
            store.get_mapping("Lab").unwrap().unwrap().version,
            SchemaVersion::new(1, 0)
        );
    }

    #[test]
    fn test_rollback_undoes_ddl() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.begin().unwrap();
        store.create_table(&table()).unwrap();
        store.put_mapping(&entry()).unwrap();
        store.rollback().unwrap();

        assert!(sqlite_columns(&store, "lb_Sample").is_empty());
        assert!(store.table("lb_Sample").unwrap().is_none());
        assert!(store.get_mapping("Lab").unwrap().is_none());
    }

    #[test]
    fn test_engine_errors_surface() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(
            store.create_table(&table()).unwrap_err().kind(),
            ErrorKind::DdlExecution
        );

        store.begin().unwrap();
        store.create_table(&table()).unwrap();
        // Duplicate table is rejected by SQLite itself.
        assert!(store.create_table(&table()).is_err());
        store.rollback().unwrap();
    }

    #[test]
    fn test_file_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classmap.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.begin().unwrap();
            store.create_table(&table()).unwrap();
            store.put_mapping(&entry()).unwrap();
            store.commit().unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_mapping("Lab").unwrap().is_some());
        assert_eq!(sqlite_columns(&store, "lb_Sample").len(), 2);
    }
}
