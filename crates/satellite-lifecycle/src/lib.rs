//! satellite-lifecycle
//!
//! Lifecycle of satellite chains secured by the primary chain's validators:
//! registration, initialization, launch at the spawn time, stop, and removal
//! once the unbonding delay has passed. Launches and removals are driven by
//! two timestamp-keyed queues drained once per block, each due chain running
//! in its own isolated scope.

pub mod context;
pub mod keeper;
pub mod launcher;
pub mod phase;
pub mod ports;
pub mod power;
pub mod query;
pub mod records;
pub mod remover;
pub mod scheduler;
pub mod snapshot;
pub mod time_queue;
pub mod valset;

pub use context::{BlockHeader, ExecCtx};
pub use keeper::{BlockReport, LifecycleKeeper};
pub use launcher::Launcher;
pub use phase::{ensure_transition, PhaseRegistry};
pub use ports::{ChannelService, ClientService, Collaborators, SelfConsensusSource, StakingSource};
pub use query::LifecycleQuery;
pub use records::SatelliteRecords;
pub use remover::Remover;
pub use scheduler::{LifecycleScheduler, TickReport};
pub use snapshot::{GenesisSnapshot, SnapshotBuilder};
pub use time_queue::{DueEntry, KeyedTimeQueue, REMOVAL_QUEUE, SPAWN_QUEUE};
pub use valset::{diff_validators, validator_set_hash};
