use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{Height, Timestamp};

/// Light-client state handed to the client-creation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    /// Chain the client tracks.
    pub chain_id: String,
    pub trust_level: (u64, u64),
    pub trusting_period: Duration,
    pub unbonding_period: Duration,
    pub max_clock_drift: Duration,
    pub latest_height: Height,
    pub frozen: bool,
}

/// Consensus state at a given height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusState {
    pub timestamp: Timestamp,
    pub root: Vec<u8>,
    pub next_validators_hash: [u8; 32],
}

/// State of a channel as reported by the channel service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Init,
    TryOpen,
    Open,
    Closed,
}
