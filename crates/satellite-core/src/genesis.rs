use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{ClientState, ConsensusState};
use crate::validator::ValidatorUpdate;

/// Parameters the satellite chain starts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteParams {
    pub enabled: bool,
    pub blocks_per_distribution_transmission: i64,
    pub distribution_transmission_channel: String,
    pub provider_fee_pool_address: String,
    pub ccv_timeout_period: Duration,
    pub transfer_timeout_period: Duration,
    pub redistribution_fraction: String,
    pub historical_entries: i64,
    pub unbonding_period: Duration,
    pub retry_delay_period: Duration,
}

/// What the satellite needs to know about the provider at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Client of the provider chain the satellite creates at genesis.
    pub client_state: ClientState,
    pub consensus_state: ConsensusState,
    /// Every entry is an "add" against the empty set.
    pub initial_val_set: Vec<ValidatorUpdate>,
}

/// Bootstrap genesis persisted at launch. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteGenesis {
    pub params: SatelliteParams,
    pub provider: ProviderInfo,
    pub new_chain: bool,
}
