//! Schema catalog persisted in sled.

use super::entry::CatalogEntry;
use crate::error::Error;
use crate::schema::SchemaVersion;
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::collections::HashMap;

/// Tree name for current catalog entries, keyed by schema name.
pub(crate) const MAPPING_TREE: &str = "catalog:mappings";

/// Tree name for every imported version of every schema.
pub(crate) const HISTORY_TREE: &str = "catalog:history";

/// Key of one version of a schema in the history tree.
pub(crate) fn history_key(schema: &str, version: SchemaVersion) -> Vec<u8> {
    let mut key = Vec::with_capacity(schema.len() + 9);
    key.extend_from_slice(schema.as_bytes());
    key.push(0);
    key.extend_from_slice(&version.major.to_be_bytes());
    key.extend_from_slice(&version.minor.to_be_bytes());
    key
}

/// The persisted record of imported schemas.
pub struct SchemaCatalog {
    /// Current entries.
    mapping_tree: Tree,
    /// Entries of every imported version.
    history_tree: Tree,
    /// Current entries (cached).
    cache: RwLock<HashMap<String, CatalogEntry>>,
}

impl SchemaCatalog {
    /// Open or create a catalog using the given sled database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        let mapping_tree = db.open_tree(MAPPING_TREE)?;
        let history_tree = db.open_tree(HISTORY_TREE)?;

        let mut cache = HashMap::new();
        for result in mapping_tree.iter() {
            let (_, bytes) = result?;
            let entry = CatalogEntry::from_bytes(&bytes)?;
            cache.insert(entry.schema_name.clone(), entry);
        }

        Ok(Self {
            mapping_tree,
            history_tree,
            cache: RwLock::new(cache),
        })
    }

    /// Get the current entry of a schema.
    pub fn get(&self, schema: &str) -> Result<Option<CatalogEntry>, Error> {
        Ok(self.cache.read().get(schema).cloned())
    }

    /// Store an entry as the current one for its schema.
    pub fn put(&self, entry: &CatalogEntry) -> Result<(), Error> {
        let bytes = entry.to_bytes()?;
        self.mapping_tree
            .insert(entry.schema_name.as_bytes(), bytes.clone())?;
        self.history_tree
            .insert(history_key(&entry.schema_name, entry.version), bytes)?;
        self.refresh(entry.clone());
        Ok(())
    }

    /// Remove a schema's current entry. History is kept.
    pub fn remove(&self, schema: &str) -> Result<Option<CatalogEntry>, Error> {
        self.mapping_tree.remove(schema.as_bytes())?;
        Ok(self.cache.write().remove(schema))
    }

    /// Names of every catalogued schema, sorted.
    pub fn list(&self) -> Result<Vec<String>, Error> {
        let mut names: Vec<String> = self.cache.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Every imported version of a schema, ascending.
    pub fn versions(&self, schema: &str) -> Result<Vec<SchemaVersion>, Error> {
        let mut prefix = schema.as_bytes().to_vec();
        prefix.push(0);
        let mut versions = Vec::new();
        for result in self.history_tree.scan_prefix(&prefix) {
            let (key, _) = result?;
            let suffix = &key[prefix.len()..];
            if suffix.len() == 8 {
                let mut major = [0u8; 4];
                let mut minor = [0u8; 4];
                major.copy_from_slice(&suffix[..4]);
                minor.copy_from_slice(&suffix[4..]);
                versions.push(SchemaVersion::new(
                    u32::from_be_bytes(major),
                    u32::from_be_bytes(minor),
                ));
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// The entry recorded when a given version was imported.
    pub fn entry_at(&self, schema: &str, version: SchemaVersion) -> Result<Option<CatalogEntry>, Error> {
        match self.history_tree.get(history_key(schema, version))? {
            Some(bytes) => Ok(Some(CatalogEntry::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.mapping_tree.flush()?;
        self.history_tree.flush()?;
        Ok(())
    }

    pub(crate) fn mapping_tree(&self) -> &Tree {
        &self.mapping_tree
    }

    pub(crate) fn history_tree(&self) -> &Tree {
        &self.history_tree
    }

    /// Update the cache after a transactional write.
    pub(crate) fn refresh(&self, entry: CatalogEntry) {
        self.cache.write().insert(entry.schema_name.clone(), entry);
    }
}
