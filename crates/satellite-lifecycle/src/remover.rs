use satellite_core::client::ChannelState;
use satellite_core::constants::*;
use satellite_core::error::SatelliteError;
use satellite_core::event::Event;
use satellite_core::params::LifecycleParams;
use satellite_core::types::{Phase, SatelliteId};
use tracing::{error, info, warn};

use crate::context::ExecCtx;
use crate::phase::{ensure_transition, PhaseRegistry};
use crate::ports::Collaborators;
use crate::records::SatelliteRecords;

/// Tears down a Stopped satellite and marks it Deleted.
///
/// Chain id, phase, metadata and parameters are kept for historical lookup.
/// Everything else stored per chain is deleted.
pub struct Remover<'a> {
    params: &'a LifecycleParams,
    collaborators: &'a Collaborators,
}

impl<'a> Remover<'a> {
    pub fn new(params: &'a LifecycleParams, collaborators: &'a Collaborators) -> Self {
        Self {
            params,
            collaborators,
        }
    }

    pub fn remove(&self, ctx: &mut ExecCtx<'_>, id: &SatelliteId) -> Result<(), SatelliteError> {
        let phase = ctx.store().phase(id)?;
        ensure_transition(id, phase, Phase::Deleted)?;

        // Checked before any delete so a corrupt chain is left untouched.
        if let Err(e) = ctx.store().check_key_assignments(id) {
            error!(satellite_id = %id, error = %e, "key assignment state is inconsistent; aborting teardown");
            return Err(e);
        }

        let store = ctx.store_mut();
        store.delete_client_id(id)?;
        store.delete_genesis(id)?;
        store.delete_key_assignments(id)?;
        store.delete_min_power_in_top_n(id)?;
        store.delete_equivocation_evidence_min_height(id)?;

        if let Some(channel_id) = ctx.store().channel_id(id)? {
            self.close_channel(id, &channel_id);
            ctx.store_mut().delete_channel(id, &channel_id)?;
        }

        let store = ctx.store_mut();
        for provider in store.commission_rate_validators(id)? {
            store.delete_commission_rate(id, &provider)?;
        }
        store.delete_init_chain_height(id)?;
        store.delete_slash_acks(id)?;
        store.delete_pending_packets(id)?;
        store.delete_allowlist(id)?;
        store.delete_denylist(id)?;
        store.delete_all_opted_in(id)?;
        store.delete_validator_set(id)?;
        store.delete_rewards_allocation(id)?;
        store.delete_removal_time(id)?;

        store.set_phase(id, Phase::Deleted)?;
        info!(satellite_id = %id, "satellite deleted");

        let at = ctx.block_time();
        ctx.emit(
            Event::new(EVENT_SATELLITE_DELETED)
                .with(ATTR_MODULE, MODULE_NAME)
                .with(ATTR_SATELLITE_ID, id)
                .with(ATTR_DELETED_AT, at),
        );
        Ok(())
    }

    /// Close the channel unless it is already closed or unknown. Failure is
    /// logged and otherwise ignored.
    fn close_channel(&self, id: &SatelliteId, channel_id: &str) {
        let channels = &self.collaborators.channels;
        match channels.channel(&self.params.provider_port_id, channel_id) {
            Some(ChannelState::Closed) | None => {}
            Some(_) => {
                if let Err(e) = channels.close_channel(channel_id) {
                    warn!(
                        satellite_id = %id,
                        channel_id,
                        error = %e,
                        "channel to satellite could not be closed"
                    );
                }
            }
        }
    }
}
