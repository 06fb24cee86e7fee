use thiserror::Error;

use crate::types::{Phase, Timestamp};

#[derive(Debug, Error)]
pub enum SatelliteError {
    // ── Phase / precondition errors ──────────────────────────────────────────
    #[error("satellite {id} is in phase {current}, requires {required}")]
    InvalidPhase {
        id: String,
        current: Phase,
        required: String,
    },

    #[error("invalid phase transition for satellite {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: Phase, to: Phase },

    #[error("unknown satellite: {0}")]
    UnknownSatellite(String),

    #[error("initialization parameters not found for satellite {0}")]
    MissingInitializationParameters(String),

    #[error("power shaping parameters not found for satellite {0}")]
    MissingPowerShapingParameters(String),

    #[error("chain id not found for satellite {0}")]
    MissingChainId(String),

    #[error("removal time not found for satellite {0}")]
    MissingRemovalTime(String),

    #[error("bootstrap genesis not found for satellite {0}")]
    NoGenesis(String),

    #[error("initial validator set is empty - no validators opted in satellite {0}")]
    EmptyValidatorSet(String),

    #[error("invalid bootstrap genesis: {0}")]
    InvalidGenesis(String),

    #[error("invalid initialization parameters: {0}")]
    InvalidInitialization(String),

    #[error("invalid spawn time for satellite {0}: an initialized chain needs a spawn time")]
    InvalidSpawnTime(String),

    #[error("invalid trust period: {0}")]
    InvalidTrustPeriod(String),

    #[error("invalid power shaping parameters: {0}")]
    InvalidPowerShaping(String),

    #[error("consumer key already assigned on satellite {id} to validator {owner}")]
    ConsumerKeyInUse { id: String, owner: String },

    // ── Time queue errors ────────────────────────────────────────────────────
    #[error("satellite {id} not found in queue bucket at {at}")]
    NotFoundInQueue { id: String, at: Timestamp },

    #[error("malformed key: {0}")]
    MalformedKey(String),

    // ── Collaborator errors ──────────────────────────────────────────────────
    #[error("no validators: {0}")]
    NoValidators(String),

    #[error("unbonding time not available: {0}")]
    NoUnbondingTime(String),

    #[error("self consensus state not found at height {height}")]
    ConsensusStateNotFound { height: u64 },

    #[error("client error: {0}")]
    Client(String),

    #[error("channel error: {0}")]
    Channel(String),

    // ── Invariant violations ─────────────────────────────────────────────────
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── General ──────────────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl SatelliteError {
    /// True for failures that may clear on a later tick: a launch or removal
    /// that fails this way keeps its place in the time queue.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SatelliteError::EmptyValidatorSet(_)
                | SatelliteError::NoValidators(_)
                | SatelliteError::NoUnbondingTime(_)
                | SatelliteError::ConsensusStateNotFound { .. }
                | SatelliteError::Client(_)
                | SatelliteError::Channel(_)
                | SatelliteError::Storage(_)
        )
    }

    pub fn invalid_phase(id: impl ToString, current: Phase, required: &[Phase]) -> Self {
        let required = required
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        SatelliteError::InvalidPhase {
            id: id.to_string(),
            current,
            required,
        }
    }
}

impl From<bincode::Error> for SatelliteError {
    fn from(e: bincode::Error) -> Self {
        SatelliteError::Serialization(e.to_string())
    }
}
