//! Single-process stand-ins for the services a provider chain would offer:
//! a fixed validator set, clients persisted in a sled tree, a self
//! consensus state stamped with wall-clock time, and a channel layer with
//! no channels.

use std::sync::Arc;
use std::time::Duration;

use satellite_core::client::{ChannelState, ClientState, ConsensusState};
use satellite_core::constants::CLIENT_TYPE;
use satellite_core::error::SatelliteError;
use satellite_core::validator::{ProviderValidator, ValidatorUpdate};
use satellite_lifecycle::{
    validator_set_hash, ChannelService, ClientService, Collaborators, SelfConsensusSource,
    StakingSource,
};
use tracing::{debug, info};

// ── Staking ──────────────────────────────────────────────────────────────────

/// Bonded validators read once from the node config.
pub struct StaticStaking {
    validators: Vec<ProviderValidator>,
    max_active: usize,
    unbonding: Duration,
}

impl StaticStaking {
    pub fn new(validators: Vec<ProviderValidator>, max_active: usize, unbonding: Duration) -> Self {
        Self {
            validators,
            max_active,
            unbonding,
        }
    }
}

impl StakingSource for StaticStaking {
    fn bonded_validators(&self) -> Result<Vec<ProviderValidator>, SatelliteError> {
        Ok(self.validators.clone())
    }

    /// The `max_active` most powerful bonded validators, all of them when `0`.
    fn active_validators(&self) -> Result<Vec<ProviderValidator>, SatelliteError> {
        let mut active = self.validators.clone();
        active.sort_by(|a, b| b.power.cmp(&a.power).then(a.address.cmp(&b.address)));
        if self.max_active > 0 {
            active.truncate(self.max_active);
        }
        Ok(active)
    }

    fn unbonding_period(&self) -> Result<Duration, SatelliteError> {
        if self.unbonding.is_zero() {
            return Err(SatelliteError::NoUnbondingTime("unbonding period is zero".into()));
        }
        Ok(self.unbonding)
    }
}

// ── Clients ──────────────────────────────────────────────────────────────────

/// Client states and their bootstrap consensus states, keyed by client id.
pub struct SledClients {
    tree: sled::Tree,
}

impl SledClients {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub fn get(&self, client_id: &str) -> Result<Option<(ClientState, ConsensusState)>, SatelliteError> {
        match self.tree.get(client_id.as_bytes()).map_err(storage)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| SatelliteError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }
}

impl ClientService for SledClients {
    fn create_client(
        &self,
        client_state: &ClientState,
        consensus_state: &ConsensusState,
    ) -> Result<String, SatelliteError> {
        if client_state.frozen {
            return Err(SatelliteError::Client("refusing to create a frozen client".into()));
        }
        let client_id = format!("{CLIENT_TYPE}-{}", self.tree.len());
        let bytes = bincode::serialize(&(client_state, consensus_state))
            .map_err(|e| SatelliteError::Serialization(e.to_string()))?;
        self.tree.insert(client_id.as_bytes(), bytes).map_err(storage)?;
        info!(
            client_id = %client_id,
            chain_id = %client_state.chain_id,
            height = %client_state.latest_height,
            "client created"
        );
        Ok(client_id)
    }
}

fn storage(e: sled::Error) -> SatelliteError {
    SatelliteError::Storage(e.to_string())
}

// ── Self consensus ───────────────────────────────────────────────────────────

/// Consensus state of this node: wall-clock time, a height-derived root and
/// the hash of the configured validator set.
pub struct LocalConsensus {
    next_validators_hash: [u8; 32],
}

impl LocalConsensus {
    pub fn new(validators: &[ProviderValidator]) -> Result<Self, SatelliteError> {
        let updates: Vec<ValidatorUpdate> = validators
            .iter()
            .filter(|v| v.power > 0)
            .map(|v| ValidatorUpdate {
                public_key: v.consensus_key,
                power: v.power,
            })
            .collect();
        Ok(Self {
            next_validators_hash: validator_set_hash(&updates)?,
        })
    }
}

impl SelfConsensusSource for LocalConsensus {
    fn self_consensus_state(&self, height: u64) -> Result<ConsensusState, SatelliteError> {
        Ok(ConsensusState {
            timestamp: chrono::Utc::now().timestamp(),
            root: height.to_be_bytes().to_vec(),
            next_validators_hash: self.next_validators_hash,
        })
    }
}

// ── Channels ─────────────────────────────────────────────────────────────────

/// No relay layer runs in-process, so no channel ever exists.
pub struct NoChannels;

impl ChannelService for NoChannels {
    fn channel(&self, _port_id: &str, _channel_id: &str) -> Option<ChannelState> {
        None
    }

    fn close_channel(&self, channel_id: &str) -> Result<(), SatelliteError> {
        debug!(channel_id, "close requested for unknown channel");
        Ok(())
    }
}

/// Wire the local services together.
pub fn collaborators(
    validators: Vec<ProviderValidator>,
    max_active: usize,
    unbonding: Duration,
    clients_tree: sled::Tree,
) -> Result<Collaborators, SatelliteError> {
    let consensus = LocalConsensus::new(&validators)?;
    Ok(Collaborators {
        clients: Arc::new(SledClients::new(clients_tree)),
        consensus: Arc::new(consensus),
        staking: Arc::new(StaticStaking::new(validators, max_active, unbonding)),
        channels: Arc::new(NoChannels),
    })
}
