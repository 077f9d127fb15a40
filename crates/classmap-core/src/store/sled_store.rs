//! Table store backed by sled.

use super::{check_identifier, decode_table, encode_table, rejected, MappingStore, StoreConfig};
use crate::catalog::{history_key, CatalogEntry, SchemaCatalog};
use crate::ddl::DdlStatement;
use crate::error::{Error, Result};
use crate::mapping::{ColumnDef, MappedTable};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Tree name for table definitions, keyed by table name.
pub const TABLE_TREE: &str = "store:tables";

/// Changes staged since `begin`.
#[derive(Debug, Default)]
struct Staged {
    /// Final state of every touched table; `None` means dropped.
    tables: BTreeMap<String, Option<MappedTable>>,
    /// Catalog entries to record.
    mappings: Vec<CatalogEntry>,
}

/// A [`MappingStore`] keeping table definitions and the catalog in sled.
///
/// Operations are staged in memory and applied in one multi-tree transaction
/// on commit.
pub struct SledStore {
    db: Db,
    tables: Tree,
    catalog: SchemaCatalog,
    max_identifier_len: usize,
    staged: Option<Staged>,
}

impl SledStore {
    /// Open a store with the given configuration.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db = config.to_sled_config().open()?;
        Self::with_db(db, config.max_identifier_len)
    }

    /// Open a temporary store for testing.
    pub fn temporary() -> Result<Self> {
        Self::open(&StoreConfig::temporary())
    }

    /// Use an already opened sled database.
    pub fn with_db(db: Db, max_identifier_len: usize) -> Result<Self> {
        let tables = db.open_tree(TABLE_TREE)?;
        let catalog = SchemaCatalog::open(&db)?;
        Ok(Self {
            db,
            tables,
            catalog,
            max_identifier_len,
            staged: None,
        })
    }

    /// The schema catalog, including version history.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Names of every committed table, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for result in self.tables.iter() {
            let (key, _) = result?;
            names.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(names)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn staged(&mut self) -> Result<&mut Staged> {
        self.staged.as_mut().ok_or_else(|| {
            Error::DdlExecution {
                statement: "-".to_string(),
                reason: "no transaction in progress".to_string(),
            }
        })
    }

    /// Table as seen inside the transaction.
    fn current(&self, name: &str) -> Result<Option<MappedTable>> {
        if let Some(staged) = &self.staged {
            if let Some(table) = staged.tables.get(name) {
                return Ok(table.clone());
            }
        }
        self.table(name)
    }
}

impl MappingStore for SledStore {
    fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(Error::DdlExecution {
                statement: "BEGIN".to_string(),
                reason: "transaction already in progress".to_string(),
            });
        }
        self.staged = Some(Staged::default());
        Ok(())
    }

    fn create_table(&mut self, table: &MappedTable) -> Result<()> {
        self.staged()?;
        let statement = DdlStatement::CreateTable(table.clone());
        check_identifier(&statement, &table.name, self.max_identifier_len)?;
        for column in &table.columns {
            check_identifier(&statement, &column.name, self.max_identifier_len)?;
        }
        if self.current(&table.name)?.is_some() {
            return Err(rejected(&statement, format!("table {} already exists", table.name)));
        }

        debug!(table = %table.name, "staged table creation");
        self.staged()?
            .tables
            .insert(table.name.clone(), Some(table.clone()));
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<()> {
        self.staged()?;
        let statement = DdlStatement::AddColumn {
            table: table.to_string(),
            column: column.clone(),
        };
        check_identifier(&statement, &column.name, self.max_identifier_len)?;

        let mut definition = self
            .current(table)?
            .ok_or_else(|| rejected(&statement, format!("no such table: {table}")))?;
        if definition.get_column(&column.name).is_some() {
            return Err(rejected(
                &statement,
                format!("duplicate column name: {}", column.name),
            ));
        }
        if !column.nullable {
            return Err(rejected(&statement, "cannot add a NOT NULL column"));
        }

        debug!(table = %table, column = %column.name, "staged column addition");
        definition.columns.push(column.clone());
        self.staged()?
            .tables
            .insert(table.to_string(), Some(definition));
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        self.staged()?;
        if self.current(table)?.is_none() {
            let statement = DdlStatement::DropTable {
                table: table.to_string(),
            };
            return Err(rejected(&statement, format!("no such table: {table}")));
        }

        debug!(table = %table, "staged table drop");
        self.staged()?.tables.insert(table.to_string(), None);
        Ok(())
    }

    fn put_mapping(&mut self, entry: &CatalogEntry) -> Result<()> {
        self.staged()?.mappings.push(entry.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    fn commit(&mut self) -> Result<()> {
        let staged = self.staged.take().ok_or_else(|| Error::DdlExecution {
            statement: "COMMIT".to_string(),
            reason: "no transaction in progress".to_string(),
        })?;

        let mut table_ops = Vec::with_capacity(staged.tables.len());
        for (name, table) in &staged.tables {
            let bytes = table.as_ref().map(encode_table).transpose()?;
            table_ops.push((name.as_bytes(), bytes));
        }
        let mut mapping_ops = Vec::with_capacity(staged.mappings.len());
        for entry in &staged.mappings {
            mapping_ops.push((entry, entry.to_bytes()?));
        }

        let result: std::result::Result<(), TransactionError<Error>> = (
            &self.tables,
            self.catalog.mapping_tree(),
            self.catalog.history_tree(),
        )
            .transaction(|(tables_tx, mapping_tx, history_tx)| {
                for (name, bytes) in &table_ops {
                    match bytes {
                        Some(bytes) => {
                            tables_tx.insert(*name, bytes.as_slice())?;
                        }
                        None => {
                            tables_tx.remove(*name)?;
                        }
                    }
                }
                for (entry, bytes) in &mapping_ops {
                    mapping_tx.insert(entry.schema_name.as_bytes(), bytes.as_slice())?;
                    history_tx.insert(
                        history_key(&entry.schema_name, entry.version),
                        bytes.as_slice(),
                    )?;
                }
                Ok::<(), ConflictableTransactionError<Error>>(())
            });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(Error::Storage(e)),
        }

        for entry in staged.mappings {
            self.catalog.refresh(entry);
        }
        self.db.flush()?;
        debug!(tables = table_ops.len(), "committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }

    fn get_mapping(&self, schema: &str) -> Result<Option<CatalogEntry>> {
        self.catalog.get(schema)
    }

    fn list_schemas(&self) -> Result<Vec<String>> {
        self.catalog.list()
    }

    fn table(&self, name: &str) -> Result<Option<MappedTable>> {
        match self.tables.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(decode_table(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mapping::{SqlKind, TableKind};
    use crate::schema::SchemaVersion;

    fn table(name: &str) -> MappedTable {
        MappedTable::new(name, TableKind::Class, "Sample")
            .with_column(ColumnDef::instance_id())
            .with_column(ColumnDef::property("Label", "Label", SqlKind::Text))
    }

    fn entry() -> CatalogEntry {
        CatalogEntry {
            schema_name: "Lab".into(),
            alias: "lb".into(),
            version: SchemaVersion::new(1, 0),
            classes: Vec::new(),
            tables: vec![table("lb_Sample")],
            relationships: Vec::new(),
            property_paths: Vec::new(),
            imported_at: 0,
        }
    }

    #[test]
    fn test_commit_makes_changes_visible() {
        let mut store = SledStore::temporary().unwrap();
        store.begin().unwrap();
        store.create_table(&table("lb_Sample")).unwrap();
        store.put_mapping(&entry()).unwrap();

        // Not visible before commit.
        assert!(store.table("lb_Sample").unwrap().is_none());
        assert!(store.get_mapping("Lab").unwrap().is_none());

        store.commit().unwrap();
        assert!(store.table("lb_Sample").unwrap().is_some());
        assert_eq!(store.list_schemas().unwrap(), vec!["Lab".to_string()]);
        assert_eq!(
            store.catalog().versions("Lab").unwrap(),
            vec![SchemaVersion::new(1, 0)]
        );
    }

    #[test]
    fn test_rollback_discards() {
        let mut store = SledStore::temporary().unwrap();
        store.begin().unwrap();
        store.create_table(&table("lb_Sample")).unwrap();
        store.put_mapping(&entry()).unwrap();
        store.rollback().unwrap();

        assert!(store.table("lb_Sample").unwrap().is_none());
        assert!(store.get_mapping("Lab").unwrap().is_none());
        assert!(store.table_names().unwrap().is_empty());
    }

    #[test]
    fn test_add_column_and_drop() {
        let mut store = SledStore::temporary().unwrap();
        store.begin().unwrap();
        store.create_table(&table("lb_Sample")).unwrap();
        store
            .add_column("lb_Sample", &ColumnDef::property("Mass", "Mass", SqlKind::Real))
            .unwrap();
        store.commit().unwrap();

        let stored = store.table("lb_Sample").unwrap().unwrap();
        assert_eq!(stored.column_names(), vec!["ECInstanceId", "Label", "Mass"]);

        store.begin().unwrap();
        store.drop_table("lb_Sample").unwrap();
        store.commit().unwrap();
        assert!(store.table("lb_Sample").unwrap().is_none());
    }

    #[test]
    fn test_rejections() {
        let mut store = SledStore::open(&StoreConfig::temporary().with_max_identifier_len(12)).unwrap();

        // No transaction.
        assert!(store.create_table(&table("lb_Sample")).is_err());

        store.begin().unwrap();
        store.create_table(&table("lb_Sample")).unwrap();

        let dup = store.create_table(&table("lb_Sample")).unwrap_err();
        assert_eq!(dup.kind(), ErrorKind::DdlExecution);

        let long = store.create_table(&table("lb_VeryLongTableName")).unwrap_err();
        assert_eq!(long.kind(), ErrorKind::DdlExecution);

        let not_null = store
            .add_column(
                "lb_Sample",
                &ColumnDef::system("Extra", crate::mapping::ColumnRole::ClassId, SqlKind::BigInt),
            )
            .unwrap_err();
        assert_eq!(not_null.kind(), ErrorKind::DdlExecution);

        assert!(store.add_column("lb_Missing", &ColumnDef::property("A", "A", SqlKind::Text)).is_err());
        assert!(store.drop_table("lb_Missing").is_err());
        assert!(store.begin().is_err());
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path());

        {
            let mut store = SledStore::open(&config).unwrap();
            store.begin().unwrap();
            store.create_table(&table("lb_Sample")).unwrap();
            store.put_mapping(&entry()).unwrap();
            store.commit().unwrap();
        }

        {
            let store = SledStore::open(&config).unwrap();
            assert!(store.table("lb_Sample").unwrap().is_some());
            let entry = store.get_mapping("Lab").unwrap().unwrap();
            assert_eq!(entry.version, SchemaVersion::new(1, 0));
        }
    }
}
