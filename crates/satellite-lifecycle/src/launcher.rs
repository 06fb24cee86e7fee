use satellite_core::client::{ClientState, ConsensusState};
use satellite_core::constants::*;
use satellite_core::error::SatelliteError;
use satellite_core::event::Event;
use satellite_core::params::LifecycleParams;
use satellite_core::types::{Phase, SatelliteId};
use tracing::info;

use crate::context::ExecCtx;
use crate::phase::{ensure_transition, PhaseRegistry};
use crate::ports::Collaborators;
use crate::records::SatelliteRecords;
use crate::snapshot::SnapshotBuilder;

/// Moves an Initialized satellite to Launched.
pub struct Launcher<'a> {
    params: &'a LifecycleParams,
    collaborators: &'a Collaborators,
}

impl<'a> Launcher<'a> {
    pub fn new(params: &'a LifecycleParams, collaborators: &'a Collaborators) -> Self {
        Self {
            params,
            collaborators,
        }
    }

    /// Build and persist the bootstrap genesis, then create the client that
    /// tracks the satellite and mark the chain Launched.
    ///
    /// Client creation is the last external call: every check that can fail
    /// runs before it. Callers run this inside an isolated scope so that a
    /// failure leaves no trace. Returns the new client id.
    pub fn launch(&self, ctx: &mut ExecCtx<'_>, id: &SatelliteId) -> Result<String, SatelliteError> {
        let phase = ctx.store().phase(id)?;
        ensure_transition(id, phase, Phase::Launched)?;

        let init = ctx.store().initialization_parameters(id)?;
        let chain_id = ctx.store().chain_id(id)?;

        let snapshot = SnapshotBuilder::new(self.params, self.collaborators).build(ctx, id)?;
        ctx.store_mut().set_genesis(id, &snapshot.genesis)?;

        let genesis = ctx
            .store()
            .genesis(id)?
            .ok_or_else(|| SatelliteError::NoGenesis(id.to_string()))?;
        if genesis.provider.initial_val_set.is_empty() {
            return Err(SatelliteError::EmptyValidatorSet(id.to_string()));
        }

        let height = ctx.block_height();
        ctx.store_mut()
            .set_equivocation_evidence_min_height(id, init.initial_height.revision_height)?;
        ctx.store_mut().set_init_chain_height(id, height)?;

        let template = &self.params.template_client;
        let client_state = ClientState {
            chain_id: chain_id.clone(),
            trust_level: template.trust_level,
            trusting_period: snapshot.satellite_trusting_period,
            unbonding_period: init.unbonding_period,
            max_clock_drift: template.max_clock_drift,
            latest_height: init.initial_height,
            frozen: false,
        };
        let consensus_state = ConsensusState {
            timestamp: ctx.block_time(),
            root: SENTINEL_ROOT.to_vec(),
            next_validators_hash: snapshot.validator_set_hash,
        };

        let client_id = self
            .collaborators
            .clients
            .create_client(&client_state, &consensus_state)?;
        ctx.store_mut().set_client_id(id, &client_id)?;
        ctx.store_mut().set_phase(id, Phase::Launched)?;

        info!(
            satellite_id = %id,
            chain_id = %chain_id,
            client_id = %client_id,
            validators = snapshot.validators.len(),
            "satellite launched (client created)"
        );
        ctx.emit(
            Event::new(EVENT_CLIENT_CREATED)
                .with(ATTR_MODULE, MODULE_NAME)
                .with(ATTR_SATELLITE_ID, id)
                .with(ATTR_CHAIN_ID, &chain_id)
                .with(ATTR_CLIENT_ID, &client_id)
                .with(ATTR_INITIAL_HEIGHT, init.initial_height)
                .with(ATTR_TRUSTING_PERIOD, format!("{:?}", client_state.trusting_period))
                .with(ATTR_UNBONDING_PERIOD, format!("{:?}", client_state.unbonding_period)),
        );
        Ok(client_id)
    }
}
