use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use satellite_core::params::LifecycleParams;
use satellite_core::types::{PublicKey, ValidatorAddress};
use satellite_core::validator::ProviderValidator;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("validator {index}: {reason}")]
    Validator { index: usize, reason: String },

    #[error(transparent)]
    Lifecycle(#[from] satellite_core::error::SatelliteError),
}

/// A provider validator as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Hex-encoded 20-byte consensus address.
    pub address: String,
    /// Hex-encoded 32-byte consensus key.
    pub consensus_key: String,
    pub power: u64,
    pub tokens: u64,
}

impl ValidatorConfig {
    fn to_validator(&self, index: usize) -> Result<ProviderValidator, ConfigError> {
        let bad = |reason: String| ConfigError::Validator { index, reason };
        let address = ValidatorAddress::from_hex(&self.address).map_err(|e| bad(format!("address: {e}")))?;
        let key_bytes = hex::decode(&self.consensus_key).map_err(|e| bad(format!("consensus key: {e}")))?;
        let key: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| bad("consensus key must be 32 bytes".into()))?;
        Ok(ProviderValidator {
            address,
            consensus_key: PublicKey(key),
            power: self.power,
            tokens: self.tokens,
        })
    }
}

/// Node configuration, read from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Chain id of the provider chain this node stands in for.
    pub provider_chain_id: String,
    pub data_dir: PathBuf,
    pub tick_interval_secs: u64,
    /// Provider unbonding period served by the local staking source.
    pub unbonding_period_secs: u64,
    /// Bonded validators served by the local staking source.
    pub validators: Vec<ValidatorConfig>,
    pub lifecycle: LifecycleParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            provider_chain_id: "provider-1".into(),
            data_dir: PathBuf::from("~/.satellite/data"),
            tick_interval_secs: 5,
            unbonding_period_secs: 21 * 24 * 3600,
            validators: Vec::new(),
            lifecycle: LifecycleParams::default(),
        }
    }
}

impl NodeConfig {
    /// Load from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.lifecycle.validate()?;
        config.provider_validators()?;
        Ok(config)
    }

    pub fn provider_validators(&self) -> Result<Vec<ProviderValidator>, ConfigError> {
        self.validators
            .iter()
            .enumerate()
            .map(|(i, v)| v.to_validator(i))
            .collect()
    }
}
