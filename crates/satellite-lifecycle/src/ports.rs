//! Capabilities the lifecycle core consumes from its environment.

use std::sync::Arc;
use std::time::Duration;

use satellite_core::client::{ChannelState, ClientState, ConsensusState};
use satellite_core::error::SatelliteError;
use satellite_core::validator::ProviderValidator;

/// Creates light clients of other chains.
pub trait ClientService: Send + Sync {
    /// Returns the id of the newly created client.
    fn create_client(
        &self,
        client_state: &ClientState,
        consensus_state: &ConsensusState,
    ) -> Result<String, SatelliteError>;
}

/// Consensus state of the primary chain itself.
pub trait SelfConsensusSource: Send + Sync {
    fn self_consensus_state(&self, height: u64) -> Result<ConsensusState, SatelliteError>;
}

/// Bonded-validator bookkeeping of the primary chain.
pub trait StakingSource: Send + Sync {
    fn bonded_validators(&self) -> Result<Vec<ProviderValidator>, SatelliteError>;

    /// The subset of bonded validators taking part in primary-chain consensus.
    fn active_validators(&self) -> Result<Vec<ProviderValidator>, SatelliteError>;

    fn unbonding_period(&self) -> Result<Duration, SatelliteError>;
}

/// Channel handshake and relay layer.
pub trait ChannelService: Send + Sync {
    fn channel(&self, port_id: &str, channel_id: &str) -> Option<ChannelState>;

    fn close_channel(&self, channel_id: &str) -> Result<(), SatelliteError>;
}

/// Every collaborator the keeper talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub clients: Arc<dyn ClientService>,
    pub consensus: Arc<dyn SelfConsensusSource>,
    pub staking: Arc<dyn StakingSource>,
    pub channels: Arc<dyn ChannelService>,
}
