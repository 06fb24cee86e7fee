//! Bootstrap genesis construction.

use std::time::Duration;

use satellite_core::client::ClientState;
use satellite_core::constants::DEFAULT_RETRY_DELAY_SECS;
use satellite_core::error::SatelliteError;
use satellite_core::genesis::{ProviderInfo, SatelliteGenesis, SatelliteParams};
use satellite_core::params::{calculate_trust_period, LifecycleParams};
use satellite_core::types::{Height, SatelliteId};
use satellite_core::validator::ConsensusValidator;
use tracing::info;

use crate::context::ExecCtx;
use crate::ports::Collaborators;
use crate::power::{compute_min_power_in_top_n, compute_next_validators, opt_in_top_n};
use crate::records::SatelliteRecords;
use crate::valset::{diff_validators, validator_set_hash};

/// Everything a launch needs from one genesis build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisSnapshot {
    pub genesis: SatelliteGenesis,
    /// Hash of `genesis.provider.initial_val_set`.
    pub validator_set_hash: [u8; 32],
    pub validators: Vec<ConsensusValidator>,
    /// Trusting period of the client tracking the satellite, derived from
    /// the satellite's own unbonding period.
    pub satellite_trusting_period: Duration,
}

/// Builds the bootstrap genesis of a satellite from the provider's
/// validator set and the chain's power-shaping parameters.
///
/// Every read is taken at the height of the context it runs in. Top-N
/// opt-ins, the top-N threshold and the resulting validator set are written
/// to the context's store.
pub struct SnapshotBuilder<'a> {
    params: &'a LifecycleParams,
    collaborators: &'a Collaborators,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(params: &'a LifecycleParams, collaborators: &'a Collaborators) -> Self {
        Self {
            params,
            collaborators,
        }
    }

    pub fn build(&self, ctx: &mut ExecCtx<'_>, id: &SatelliteId) -> Result<GenesisSnapshot, SatelliteError> {
        let init = ctx.store().initialization_parameters(id)?;
        let shaping = ctx.store().power_shaping_parameters(id)?;
        let staking = &self.collaborators.staking;

        let satellite_trusting_period =
            calculate_trust_period(init.unbonding_period, &self.params.trusting_period_fraction)?;

        let provider_unbonding = staking.unbonding_period()?;
        let height = Height::new(revision_number(ctx.chain_id()), ctx.block_height());
        let client_state = ClientState {
            chain_id: ctx.chain_id().to_string(),
            trust_level: self.params.template_client.trust_level,
            trusting_period: calculate_trust_period(
                provider_unbonding,
                &self.params.trusting_period_fraction,
            )?,
            unbonding_period: provider_unbonding,
            max_clock_drift: self.params.template_client.max_clock_drift,
            latest_height: height,
            frozen: false,
        };
        let consensus_state = self
            .collaborators
            .consensus
            .self_consensus_state(ctx.block_height())?;

        let bonded = staking.bonded_validators()?;
        let active = staking.active_validators()?;
        if shaping.top_n > 0 {
            let min_power = compute_min_power_in_top_n(&active, shaping.top_n)?;
            info!(satellite_id = %id, min_power, "minimum power in top N at genesis");
            opt_in_top_n(ctx.store_mut(), id, &active, min_power)?;
        }

        let validators = compute_next_validators(
            ctx.store(),
            id,
            &bonded,
            &active,
            &shaping,
        )?;
        ctx.store_mut().set_validator_set(id, &validators)?;

        let initial_val_set = diff_validators(&[], &validators);
        let validator_set_hash = validator_set_hash(&initial_val_set)?;

        let genesis = SatelliteGenesis {
            params: SatelliteParams {
                enabled: true,
                blocks_per_distribution_transmission: init.blocks_per_distribution_transmission,
                distribution_transmission_channel: init.distribution_transmission_channel.clone(),
                provider_fee_pool_address: String::new(),
                ccv_timeout_period: init.ccv_timeout_period,
                transfer_timeout_period: init.transfer_timeout_period,
                redistribution_fraction: init.redistribution_fraction.clone(),
                historical_entries: init.historical_entries,
                unbonding_period: init.unbonding_period,
                retry_delay_period: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            },
            provider: ProviderInfo {
                client_state,
                consensus_state,
                initial_val_set,
            },
            new_chain: true,
        };

        Ok(GenesisSnapshot {
            genesis,
            validator_set_hash,
            validators,
            satellite_trusting_period,
        })
    }
}

/// Revision number encoded as a trailing `-N` in a chain id, else 0.
pub fn revision_number(chain_id: &str) -> u64 {
    chain_id
        .rsplit_once('-')
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(0)
}
