use satellite_core::error::SatelliteError;
use satellite_core::genesis::SatelliteGenesis;
use satellite_core::types::{Phase, SatelliteId, Timestamp};
use satellite_core::validator::ConsensusValidator;
use satellite_store::KvStore;

use crate::phase::PhaseRegistry;
use crate::records::SatelliteRecords;
use crate::time_queue::{REMOVAL_QUEUE, SPAWN_QUEUE};

/// Read-only views over satellite records.
pub struct LifecycleQuery<'a> {
    store: &'a dyn KvStore,
}

impl<'a> LifecycleQuery<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    pub fn phase(&self, id: &SatelliteId) -> Result<Phase, SatelliteError> {
        self.store.phase(id)
    }

    pub fn removal_time(&self, id: &SatelliteId) -> Result<Timestamp, SatelliteError> {
        self.store.removal_time(id)
    }

    pub fn client_id(&self, id: &SatelliteId) -> Result<Option<String>, SatelliteError> {
        self.store.client_id(id)
    }

    pub fn genesis(&self, id: &SatelliteId) -> Result<Option<SatelliteGenesis>, SatelliteError> {
        self.store.genesis(id)
    }

    pub fn validator_set(&self, id: &SatelliteId) -> Result<Vec<ConsensusValidator>, SatelliteError> {
        self.store.validator_set(id)
    }

    pub fn satellites_in_phase(&self, phase: Phase) -> Result<Vec<SatelliteId>, SatelliteError> {
        self.store.satellites_in_phase(phase)
    }

    /// Spawn-queue buckets, oldest first.
    pub fn pending_launches(&self) -> Result<Vec<(Timestamp, Vec<SatelliteId>)>, SatelliteError> {
        SPAWN_QUEUE.buckets(self.store)
    }

    /// Removal-queue buckets, oldest first.
    pub fn pending_removals(&self) -> Result<Vec<(Timestamp, Vec<SatelliteId>)>, SatelliteError> {
        REMOVAL_QUEUE.buckets(self.store)
    }

    /// One-line summary of a satellite's state.
    pub fn describe(&self, id: &SatelliteId, now: Timestamp) -> Result<String, SatelliteError> {
        let status = match self.phase(id)? {
            Phase::Unspecified => return Err(SatelliteError::UnknownSatellite(id.to_string())),
            Phase::Registered => "registered, no spawn time".to_string(),
            Phase::Initialized => {
                let spawn = self.store.initialization_parameters(id)?.spawn_time;
                if spawn > now {
                    format!("initialized, spawns in {}s", spawn - now)
                } else {
                    format!("initialized, spawn time {spawn} passed; waiting for validators")
                }
            }
            Phase::Launched => {
                let client = self.client_id(id)?.unwrap_or_else(|| "-".to_string());
                let validators = self.validator_set(id)?.len();
                format!("launched, client {client}, {validators} validators")
            }
            Phase::Stopped => {
                let at = self.removal_time(id)?;
                if at > now {
                    format!("stopped, removal in {}s", at - now)
                } else {
                    "stopped, removal due".to_string()
                }
            }
            Phase::Deleted => "deleted".to_string(),
        };
        let chain_id = self.store.chain_id(id)?;
        let name = self
            .store
            .metadata(id)?
            .map(|m| m.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "-".to_string());

        Ok(format!("satellite {id} | {chain_id} | {name} | {status}"))
    }
}
