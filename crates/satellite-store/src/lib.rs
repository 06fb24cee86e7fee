//! satellite-store
//!
//! The byte-keyed storage capability used by the lifecycle core, its
//! in-memory and sled-backed implementations, the copy-on-write overlay used
//! for per-chain failure isolation, and the key layout.

pub mod cache;
pub mod keys;
pub mod kv;
pub mod sled_store;

pub use cache::CacheStore;
pub use kv::{ChangeSet, KvStore, MemStore};
pub use sled_store::SledStore;
