use std::collections::BTreeMap;

use satellite_core::error::SatelliteError;

/// Writes buffered by a [`CacheStore`](crate::CacheStore). `None` marks a deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Byte-keyed storage capability injected into every lifecycle component.
///
/// `scan_prefix` returns entries in ascending key byte order; the time queues
/// rely on this to drain buckets chronologically.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SatelliteError>;

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), SatelliteError>;

    fn delete(&mut self, key: &[u8]) -> Result<(), SatelliteError>;

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, SatelliteError>;

    fn has(&self, key: &[u8]) -> Result<bool, SatelliteError> {
        Ok(self.get(key)?.is_some())
    }

    /// Delete every key starting with `prefix`. Returns how many were removed.
    fn delete_prefix(&mut self, prefix: &[u8]) -> Result<usize, SatelliteError> {
        let keys: Vec<Vec<u8>> = self
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        for key in &keys {
            self.delete(key)?;
        }
        Ok(keys.len())
    }

    /// Apply a change set produced by an overlay.
    fn apply(&mut self, changes: ChangeSet) -> Result<(), SatelliteError> {
        for (key, value) in changes.writes {
            match value {
                Some(v) => self.set(&key, &v)?,
                None => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

// ── MemStore ─────────────────────────────────────────────────────────────────

/// Ordered in-memory store. Cloneable and comparable so whole-state
/// snapshots can be taken and diffed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SatelliteError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), SatelliteError> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), SatelliteError> {
        self.entries.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, SatelliteError> {
        Ok(self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
