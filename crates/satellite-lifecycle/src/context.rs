use satellite_core::error::SatelliteError;
use satellite_core::event::Event;
use satellite_core::types::Timestamp;
use satellite_store::{CacheStore, KvStore};
use tracing::debug;

/// Block the current tick executes in. Fixed for the whole tick, so every read
/// a launch makes observes the same height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Chain id of the primary (provider) chain.
    pub chain_id: String,
    pub height: u64,
    pub time: Timestamp,
}

/// Execution context of one tick: the store, the block header and the
/// buffered events.
pub struct ExecCtx<'a> {
    store: &'a mut dyn KvStore,
    header: BlockHeader,
    events: Vec<Event>,
}

impl<'a> ExecCtx<'a> {
    pub fn new(store: &'a mut dyn KvStore, header: BlockHeader) -> Self {
        Self {
            store,
            header,
            events: Vec::new(),
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_time(&self) -> Timestamp {
        self.header.time
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    pub fn store(&self) -> &(dyn KvStore + 'a) {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut (dyn KvStore + 'a) {
        &mut *self.store
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Run `f` against a copy-on-write overlay of the store with a private
    /// event buffer.
    ///
    /// On `Ok` the overlay's writes are applied to this context's store and
    /// its events appended to this context's events. On `Err` both are
    /// dropped: nothing `f` did is observable afterwards.
    pub fn run_isolated<T, F>(&mut self, f: F) -> Result<T, SatelliteError>
    where
        F: FnOnce(&mut ExecCtx<'_>) -> Result<T, SatelliteError>,
    {
        let header = self.header.clone();
        let (outcome, changes, events) = {
            let mut cache = CacheStore::new(&*self.store);
            let mut scoped = ExecCtx::new(&mut cache, header);
            let outcome = f(&mut scoped);
            let events = scoped.events;
            (outcome, cache.into_changeset(), events)
        };
        match outcome {
            Ok(value) => {
                self.store.apply(changes)?;
                self.events.extend(events);
                Ok(value)
            }
            Err(e) => {
                debug!(
                    writes = changes.len(),
                    events = events.len(),
                    "isolated scope failed; discarding"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satellite_store::MemStore;

    fn header() -> BlockHeader {
        BlockHeader {
            chain_id: "provider-1".into(),
            height: 10,
            time: 1_000,
        }
    }

    #[test]
    fn successful_scope_merges_writes_and_events() {
        let mut store = MemStore::new();
        let mut ctx = ExecCtx::new(&mut store, header());
        ctx.run_isolated(|scoped| {
            scoped.store_mut().set(b"k", b"v")?;
            scoped.emit(Event::new("ok"));
            Ok(())
        })
        .unwrap();
        assert_eq!(ctx.events().len(), 1);
        assert_eq!(ctx.store().get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn failed_scope_leaves_no_trace() {
        let mut store = MemStore::new();
        store.set(b"keep", b"1").unwrap();
        let before = store.clone();
        {
            let mut ctx = ExecCtx::new(&mut store, header());
            let err = ctx
                .run_isolated(|scoped| -> Result<(), SatelliteError> {
                    scoped.store_mut().delete(b"keep")?;
                    scoped.store_mut().set(b"new", b"2")?;
                    scoped.emit(Event::new("lost"));
                    Err(SatelliteError::Other("boom".into()))
                })
                .unwrap_err();
            assert!(matches!(err, SatelliteError::Other(_)));
            assert!(ctx.events().is_empty());
        }
        assert_eq!(store, before);
    }

    #[test]
    fn nested_scope_sees_outer_writes() {
        let mut store = MemStore::new();
        let mut ctx = ExecCtx::new(&mut store, header());
        ctx.store_mut().set(b"outer", b"1").unwrap();
        let seen = ctx
            .run_isolated(|scoped| scoped.store().get(b"outer"))
            .unwrap();
        assert_eq!(seen, Some(b"1".to_vec()));
    }
}
