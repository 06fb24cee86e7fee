//! Multi-value queues keyed by timestamp.
//!
//! A bucket holds every id scheduled at one exact timestamp. Buckets are
//! drained in ascending timestamp order; the order of ids within a bucket is
//! insertion order but carries no meaning.

use satellite_core::error::SatelliteError;
use satellite_core::types::{SatelliteId, Timestamp};
use satellite_store::keys;
use satellite_store::KvStore;
use tracing::debug;

/// An id taken off a queue together with the timestamp it was due at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    pub due: Timestamp,
    pub id: SatelliteId,
}

/// One timestamp-keyed queue living under its own key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyedTimeQueue {
    prefix: u8,
    name: &'static str,
}

/// Chains waiting for their spawn time.
pub const SPAWN_QUEUE: KeyedTimeQueue = KeyedTimeQueue::new(keys::SPAWN_QUEUE, "spawn");

/// Stopped chains waiting for their removal time.
pub const REMOVAL_QUEUE: KeyedTimeQueue = KeyedTimeQueue::new(keys::REMOVAL_QUEUE, "removal");

impl KeyedTimeQueue {
    pub const fn new(prefix: u8, name: &'static str) -> Self {
        Self { prefix, name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ids in the bucket at `at`; empty if there is no such bucket.
    pub fn ids_at<S: KvStore + ?Sized>(
        &self,
        store: &S,
        at: Timestamp,
    ) -> Result<Vec<SatelliteId>, SatelliteError> {
        match store.get(&keys::time_key(self.prefix, at))? {
            Some(bytes) => decode_bucket(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn write_bucket<S: KvStore + ?Sized>(
        &self,
        store: &mut S,
        at: Timestamp,
        ids: &[SatelliteId],
    ) -> Result<(), SatelliteError> {
        let key = keys::time_key(self.prefix, at);
        if ids.is_empty() {
            store.delete(&key)
        } else {
            store.set(&key, &bincode::serialize(ids)?)
        }
    }

    /// Add `id` to the bucket at `at`. Duplicates are not filtered.
    pub fn append<S: KvStore + ?Sized>(
        &self,
        store: &mut S,
        at: Timestamp,
        id: &SatelliteId,
    ) -> Result<(), SatelliteError> {
        let mut ids = self.ids_at(store, at)?;
        ids.push(id.clone());
        self.write_bucket(store, at, &ids)
    }

    /// Remove one occurrence of `id` from the bucket at `at`, deleting the
    /// bucket when it becomes empty.
    pub fn remove<S: KvStore + ?Sized>(
        &self,
        store: &mut S,
        at: Timestamp,
        id: &SatelliteId,
    ) -> Result<(), SatelliteError> {
        let mut ids = self.ids_at(store, at)?;
        let pos = ids
            .iter()
            .position(|x| x == id)
            .ok_or_else(|| SatelliteError::NotFoundInQueue {
                id: id.to_string(),
                at,
            })?;
        ids.remove(pos);
        self.write_bucket(store, at, &ids)
    }

    pub fn delete_bucket<S: KvStore + ?Sized>(&self, store: &mut S, at: Timestamp) -> Result<(), SatelliteError> {
        store.delete(&keys::time_key(self.prefix, at))
    }

    /// Every bucket in ascending timestamp order.
    pub fn buckets<S: KvStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Vec<(Timestamp, Vec<SatelliteId>)>, SatelliteError> {
        store
            .scan_prefix(&[self.prefix])?
            .into_iter()
            .map(|(k, v)| Ok((keys::parse_time_key(self.prefix, &k)?, decode_bucket(&v)?)))
            .collect()
    }

    /// Earliest timestamp at which `id` is queued, if any.
    pub fn position<S: KvStore + ?Sized>(
        &self,
        store: &S,
        id: &SatelliteId,
    ) -> Result<Option<Timestamp>, SatelliteError> {
        Ok(self
            .buckets(store)?
            .into_iter()
            .find(|(_, ids)| ids.contains(id))
            .map(|(at, _)| at))
    }

    /// Take up to `limit` ids due at or before `now`, oldest bucket first.
    ///
    /// Fully consumed buckets are deleted. When the limit cuts a bucket, the
    /// ids left over stay at that bucket's timestamp. Every bucket involved
    /// is decoded before anything is written, so a malformed entry fails the
    /// drain without touching the queue.
    pub fn drain_due<S: KvStore + ?Sized>(
        &self,
        store: &mut S,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<DueEntry>, SatelliteError> {
        let mut taken: Vec<(Timestamp, Vec<SatelliteId>, Vec<SatelliteId>)> = Vec::new();
        let mut remaining = limit;

        for (k, v) in store.scan_prefix(&[self.prefix])? {
            if remaining == 0 {
                break;
            }
            let due = keys::parse_time_key(self.prefix, &k)?;
            if due > now {
                break;
            }
            let mut ids = decode_bucket(&v)?;
            let rest = if ids.len() > remaining {
                ids.split_off(remaining)
            } else {
                Vec::new()
            };
            remaining -= ids.len();
            taken.push((due, ids, rest));
        }

        let mut out = Vec::with_capacity(limit - remaining);
        for (due, ids, rest) in taken {
            if !rest.is_empty() {
                debug!(
                    queue = self.name,
                    due,
                    left = rest.len(),
                    "batch limit reached inside bucket"
                );
            }
            self.write_bucket(store, due, &rest)?;
            out.extend(ids.into_iter().map(|id| DueEntry { due, id }));
        }
        Ok(out)
    }
}

fn decode_bucket(bytes: &[u8]) -> Result<Vec<SatelliteId>, SatelliteError> {
    bincode::deserialize(bytes)
        .map_err(|e| SatelliteError::Serialization(format!("malformed queue bucket: {e}")))
}
