use std::path::Path;

use satellite_core::error::SatelliteError;
use tracing::debug;

use crate::kv::KvStore;

/// Persistent store backed by sled (pure-Rust, no C dependencies).
///
/// Lifecycle records live in the `satellite` tree. Other trees can be opened
/// on the same database through [`SledStore::open_tree`].
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SatelliteError> {
        let db = sled::open(path.as_ref()).map_err(storage)?;
        debug!(path = %path.as_ref().display(), "opened sled store");
        Self::from_db(db)
    }

    /// A throwaway database removed when dropped.
    pub fn temporary() -> Result<Self, SatelliteError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, SatelliteError> {
        let tree = db.open_tree("satellite").map_err(storage)?;
        Ok(Self { db, tree })
    }

    pub fn open_tree(&self, name: &str) -> Result<sled::Tree, SatelliteError> {
        self.db.open_tree(name).map_err(storage)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), SatelliteError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SatelliteError> {
        self.tree
            .get(key)
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), SatelliteError> {
        self.tree.insert(key, value).map_err(storage)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), SatelliteError> {
        self.tree.remove(key).map_err(storage)?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, SatelliteError> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (k, v) = item.map_err(storage)?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    /// Applies the whole change set as one sled batch.
    fn apply(&mut self, changes: crate::kv::ChangeSet) -> Result<(), SatelliteError> {
        let mut batch = sled::Batch::default();
        for (key, value) in changes.writes {
            match value {
                Some(v) => batch.insert(key, v),
                None => batch.remove(key),
            }
        }
        self.tree.apply_batch(batch).map_err(storage)
    }
}

fn storage(e: sled::Error) -> SatelliteError {
    SatelliteError::Storage(e.to_string())
}
