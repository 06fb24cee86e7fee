use serde::{Deserialize, Serialize};

use crate::types::{Power, PublicKey, ValidatorAddress};

/// A bonded validator of the primary (provider) chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderValidator {
    /// Provider-side consensus address.
    pub address: ValidatorAddress,
    /// Provider-side consensus key.
    pub consensus_key: PublicKey,
    /// Consensus voting power on the provider.
    pub power: Power,
    /// Bonded tokens (used for ordering and the min-stake check).
    pub tokens: u64,
}

/// A validator as it will appear in a satellite chain's validator set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusValidator {
    pub provider_address: ValidatorAddress,
    pub power: Power,
    /// Key the validator uses on the satellite (assigned key or the provider key).
    pub public_key: PublicKey,
}

/// One entry of a validator-set update. `power == 0` removes the validator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub public_key: PublicKey,
    pub power: Power,
}
