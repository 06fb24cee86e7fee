use satellite_core::error::SatelliteError;
use satellite_core::params::LifecycleParams;
use satellite_core::types::{SatelliteId, Timestamp, ZERO_TIME};
use satellite_store::KvStore;
use tracing::{debug, error, warn};

use crate::context::ExecCtx;
use crate::launcher::Launcher;
use crate::ports::Collaborators;
use crate::remover::Remover;
use crate::time_queue::{DueEntry, KeyedTimeQueue, REMOVAL_QUEUE, SPAWN_QUEUE};

/// Outcome of one drain of a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub succeeded: Vec<SatelliteId>,
    /// Failed with a retryable error; back in the queue at the block time.
    pub requeued: Vec<SatelliteId>,
    /// Failed for good; no longer queued.
    pub dropped: Vec<SatelliteId>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.requeued.is_empty() && self.dropped.is_empty()
    }
}

/// Drives the spawn and removal queues.
pub struct LifecycleScheduler<'a> {
    params: &'a LifecycleParams,
    collaborators: &'a Collaborators,
}

impl<'a> LifecycleScheduler<'a> {
    pub fn new(params: &'a LifecycleParams, collaborators: &'a Collaborators) -> Self {
        Self {
            params,
            collaborators,
        }
    }

    /// Move `id` from the spawn bucket at `previous` to the one at `next`.
    /// A zero `previous` means the chain was never scheduled.
    pub fn prepare_for_launch<S: KvStore + ?Sized>(
        store: &mut S,
        id: &SatelliteId,
        previous: Timestamp,
        next: Timestamp,
    ) -> Result<(), SatelliteError> {
        if previous != ZERO_TIME {
            SPAWN_QUEUE.remove(store, previous, id)?;
        }
        SPAWN_QUEUE.append(store, next, id)?;
        debug!(satellite_id = %id, previous, next, "spawn scheduled");
        Ok(())
    }

    /// Launch up to `limit` satellites whose spawn time has passed.
    pub fn process_due_launches(&self, ctx: &mut ExecCtx<'_>, limit: usize) -> Result<TickReport, SatelliteError> {
        let launcher = Launcher::new(self.params, self.collaborators);
        dispatch(ctx, SPAWN_QUEUE, limit, |scoped, id| {
            launcher.launch(scoped, id).map(|_| ())
        })
    }

    /// Delete up to `limit` stopped satellites whose removal time has passed.
    pub fn process_due_removals(&self, ctx: &mut ExecCtx<'_>, limit: usize) -> Result<TickReport, SatelliteError> {
        let remover = Remover::new(self.params, self.collaborators);
        dispatch(ctx, REMOVAL_QUEUE, limit, |scoped, id| remover.remove(scoped, id))
    }
}

/// Drain `queue` and run `op` on every due id in its own isolated scope.
///
/// Only a failure to drain the queue is returned. A failing id never stops
/// the others: retryable failures go back into the queue at the current
/// block time, behind every entry that was already due, and the rest are
/// logged and dropped.
fn dispatch<F>(
    ctx: &mut ExecCtx<'_>,
    queue: KeyedTimeQueue,
    limit: usize,
    op: F,
) -> Result<TickReport, SatelliteError>
where
    F: Fn(&mut ExecCtx<'_>, &SatelliteId) -> Result<(), SatelliteError>,
{
    let now = ctx.block_time();
    let entries = queue.drain_due(ctx.store_mut(), now, limit)?;
    let mut report = TickReport::default();

    for DueEntry { due, id } in entries {
        match ctx.run_isolated(|scoped| op(scoped, &id)) {
            Ok(()) => report.succeeded.push(id),
            Err(e) if e.is_retryable() => {
                warn!(queue = queue.name(), satellite_id = %id, due, error = %e, "will retry next tick");
                match queue.append(ctx.store_mut(), now, &id) {
                    Ok(()) => report.requeued.push(id),
                    Err(requeue) => {
                        error!(queue = queue.name(), satellite_id = %id, error = %requeue, "could not requeue");
                        report.dropped.push(id);
                    }
                }
            }
            Err(e) => {
                error!(queue = queue.name(), satellite_id = %id, error = %e, "dropped from queue");
                report.dropped.push(id);
            }
        }
    }
    Ok(report)
}
