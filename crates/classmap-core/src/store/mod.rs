//! Table stores.
//!
//! A [`MappingStore`] is the physical side of an import: it executes table
//! creations, column additions and drops inside one transaction and keeps the
//! catalog entry next to the tables, so that both change together.
//!
//! Two implementations are provided:
//! - [`SledStore`] keeps table definitions and catalog entries in sled trees.
//! - [`SqliteStore`] (feature `sqlite`) executes real DDL against SQLite.

mod config;
mod sled_store;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use config::{StoreConfig, DEFAULT_MAX_IDENTIFIER_LEN};
pub use sled_store::{SledStore, TABLE_TREE};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteStore, CATALOG_TABLE, TABLE_REGISTRY};

use crate::catalog::CatalogEntry;
use crate::ddl::DdlStatement;
use crate::error::{Error, Result};
use crate::mapping::{ColumnDef, MappedTable};

/// Transactional sink for DDL and catalog entries.
///
/// Between [`begin`](MappingStore::begin) and [`commit`](MappingStore::commit)
/// nothing is visible to other readers. Any error leaves the caller
/// responsible for calling [`rollback`](MappingStore::rollback).
pub trait MappingStore {
    /// Start a transaction.
    fn begin(&mut self) -> Result<()>;

    /// Create a table.
    fn create_table(&mut self, table: &MappedTable) -> Result<()>;

    /// Append a column to an existing table.
    fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<()>;

    /// Drop a table.
    fn drop_table(&mut self, table: &str) -> Result<()>;

    /// Record the catalog entry of a schema.
    fn put_mapping(&mut self, entry: &CatalogEntry) -> Result<()>;

    /// Make every change since `begin` visible.
    fn commit(&mut self) -> Result<()>;

    /// Discard every change since `begin`.
    fn rollback(&mut self) -> Result<()>;

    /// The committed catalog entry of a schema.
    fn get_mapping(&self, schema: &str) -> Result<Option<CatalogEntry>>;

    /// Names of every catalogued schema, sorted.
    fn list_schemas(&self) -> Result<Vec<String>>;

    /// The committed definition of a table.
    fn table(&self, name: &str) -> Result<Option<MappedTable>>;

    /// Execute one statement.
    fn execute(&mut self, statement: &DdlStatement) -> Result<()> {
        match statement {
            DdlStatement::CreateTable(table) => self.create_table(table),
            DdlStatement::AddColumn { table, column } => self.add_column(table, column),
            DdlStatement::DropTable { table } => self.drop_table(table),
        }
    }
}

/// Reject identifiers the store cannot hold.
pub(crate) fn check_identifier(statement: &DdlStatement, name: &str, max_len: usize) -> Result<()> {
    let reason = if name.is_empty() {
        "empty identifier".to_string()
    } else if name.len() > max_len {
        format!("identifier `{name}` exceeds {max_len} characters")
    } else if name.contains('\0') {
        format!("identifier `{name}` contains a NUL character")
    } else {
        return Ok(());
    };
    Err(rejected(statement, reason))
}

/// A store-side rejection of `statement`.
pub(crate) fn rejected(statement: &DdlStatement, reason: impl Into<String>) -> Error {
    Error::DdlExecution {
        statement: statement.to_sql(),
        reason: reason.into(),
    }
}

/// rkyv encoding of a table definition.
pub(crate) fn encode_table(table: &MappedTable) -> Result<Vec<u8>> {
    rkyv::to_bytes::<rkyv::rancor::Error>(table)
        .map(|v| v.to_vec())
        .map_err(|e| Error::Serialization(e.to_string()))
}

pub(crate) fn decode_table(bytes: &[u8]) -> Result<MappedTable> {
    rkyv::from_bytes::<MappedTable, rkyv::rancor::Error>(bytes)
        .map_err(|e| Error::Deserialization(e.to_string()))
}
