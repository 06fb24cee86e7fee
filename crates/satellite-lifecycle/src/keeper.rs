//! Public entry points of the lifecycle core.

use satellite_core::error::SatelliteError;
use satellite_core::params::{
    calculate_trust_period, InitializationParameters, LifecycleParams, PowerShapingParameters,
    SatelliteMetadata,
};
use satellite_core::types::{Phase, PublicKey, SatelliteId, Timestamp, ValidatorAddress, ZERO_TIME};
use satellite_store::KvStore;
use tracing::{error, info};

use crate::context::ExecCtx;
use crate::phase::{ensure_transition, PhaseRegistry};
use crate::ports::Collaborators;
use crate::records::SatelliteRecords;
use crate::scheduler::{LifecycleScheduler, TickReport};
use crate::time_queue::{REMOVAL_QUEUE, SPAWN_QUEUE};

/// Launch and removal reports of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReport {
    pub launches: TickReport,
    pub removals: TickReport,
}

/// Phases in which a chain's configuration may still change.
const CONFIGURABLE: &[Phase] = &[Phase::Registered, Phase::Initialized];

/// Phases in which validators may opt in or assign keys.
const ACTIVE: &[Phase] = &[Phase::Registered, Phase::Initialized, Phase::Launched];

pub struct LifecycleKeeper {
    params: LifecycleParams,
    collaborators: Collaborators,
}

impl LifecycleKeeper {
    pub fn new(params: LifecycleParams, collaborators: Collaborators) -> Result<Self, SatelliteError> {
        params.validate()?;
        Ok(Self {
            params,
            collaborators,
        })
    }

    pub fn params(&self) -> &LifecycleParams {
        &self.params
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn scheduler(&self) -> LifecycleScheduler<'_> {
        LifecycleScheduler::new(&self.params, &self.collaborators)
    }

    // ── Registration and configuration ───────────────────────────────────────

    /// Reject parameters the launch could never succeed with.
    fn check_initialization(&self, init: &InitializationParameters) -> Result<(), SatelliteError> {
        init.validate()?;
        calculate_trust_period(init.unbonding_period, &self.params.trusting_period_fraction)
            .map_err(|e| SatelliteError::InvalidInitialization(e.to_string()))?;
        Ok(())
    }

    /// Register a new satellite and return its identifier. With
    /// initialization parameters carrying a spawn time the chain is also
    /// initialized and queued for launch.
    pub fn register(
        &self,
        ctx: &mut ExecCtx<'_>,
        chain_id: &str,
        metadata: SatelliteMetadata,
        init: Option<InitializationParameters>,
        shaping: PowerShapingParameters,
    ) -> Result<SatelliteId, SatelliteError> {
        if chain_id.trim().is_empty() {
            return Err(SatelliteError::Config("chain id must not be empty".into()));
        }
        shaping.validate()?;
        if let Some(init) = &init {
            self.check_initialization(init)?;
        }

        ctx.run_isolated(|scoped| {
            let store = scoped.store_mut();
            let id = store.allocate_satellite_id()?;
            ensure_transition(&id, store.phase(&id)?, Phase::Registered)?;
            store.set_chain_id(&id, chain_id)?;
            store.set_metadata(&id, &metadata)?;
            store.set_power_shaping_parameters(&id, &shaping)?;
            if let Some(init) = &init {
                store.set_initialization_parameters(&id, init)?;
            }
            store.set_phase(&id, Phase::Registered)?;
            info!(satellite_id = %id, chain_id, "satellite registered");

            if init.is_some() {
                let (spawn_time, ok) = self.initialize(scoped, &id);
                if ok {
                    LifecycleScheduler::prepare_for_launch(scoped.store_mut(), &id, ZERO_TIME, spawn_time)?;
                }
            }
            Ok(id)
        })
    }

    /// Replace the initialization parameters of a chain that has not
    /// launched yet, moving its spawn if it is still queued. A chain whose
    /// queue entry was retried at a later time is moved from there; one
    /// whose entry was dropped is queued afresh. Nothing is written if the
    /// spawn cannot be moved.
    pub fn update_initialization(
        &self,
        ctx: &mut ExecCtx<'_>,
        id: &SatelliteId,
        init: InitializationParameters,
    ) -> Result<(), SatelliteError> {
        let phase = ctx.store().phase(id)?;
        if !CONFIGURABLE.contains(&phase) {
            return Err(SatelliteError::invalid_phase(id, phase, CONFIGURABLE));
        }
        self.check_initialization(&init)?;
        if phase == Phase::Initialized && init.spawn_time == ZERO_TIME {
            return Err(SatelliteError::InvalidSpawnTime(id.to_string()));
        }
        let previous = if phase == Phase::Initialized {
            SPAWN_QUEUE.position(ctx.store(), id)?.unwrap_or(ZERO_TIME)
        } else {
            ZERO_TIME
        };

        ctx.run_isolated(|scoped| {
            scoped.store_mut().set_initialization_parameters(id, &init)?;
            let (spawn_time, ok) = self.initialize(scoped, id);
            if ok {
                LifecycleScheduler::prepare_for_launch(scoped.store_mut(), id, previous, spawn_time)?;
            }
            Ok(())
        })
    }

    /// Replace the power-shaping parameters before launch.
    pub fn set_power_shaping(
        &self,
        ctx: &mut ExecCtx<'_>,
        id: &SatelliteId,
        shaping: PowerShapingParameters,
    ) -> Result<(), SatelliteError> {
        let phase = ctx.store().phase(id)?;
        if !CONFIGURABLE.contains(&phase) {
            return Err(SatelliteError::invalid_phase(id, phase, CONFIGURABLE));
        }
        shaping.validate()?;
        ctx.store_mut().set_power_shaping_parameters(id, &shaping)
    }

    /// Try to move `id` to Initialized. Returns the spawn time and `true` on
    /// success; `(0, false)` with nothing written otherwise.
    pub fn initialize(&self, ctx: &mut ExecCtx<'_>, id: &SatelliteId) -> (Timestamp, bool) {
        let store = ctx.store_mut();
        let Ok(phase) = store.phase(id) else {
            return (ZERO_TIME, false);
        };
        if ensure_transition(id, phase, Phase::Initialized).is_err() {
            return (ZERO_TIME, false);
        }
        let Ok(init) = store.initialization_parameters(id) else {
            return (ZERO_TIME, false);
        };
        if init.spawn_time == ZERO_TIME {
            return (ZERO_TIME, false);
        }
        if let Err(e) = store.set_phase(id, Phase::Initialized) {
            error!(satellite_id = %id, error = %e, "could not record initialized phase");
            return (ZERO_TIME, false);
        }
        (init.spawn_time, true)
    }

    // ── Validators ───────────────────────────────────────────────────────────

    fn require_active(&self, store: &dyn KvStore, id: &SatelliteId) -> Result<(), SatelliteError> {
        let phase = store.phase(id)?;
        if ACTIVE.contains(&phase) {
            Ok(())
        } else {
            Err(SatelliteError::invalid_phase(id, phase, ACTIVE))
        }
    }

    /// Opt `provider` in to validating `id`, optionally with a dedicated key.
    pub fn opt_in(
        &self,
        ctx: &mut ExecCtx<'_>,
        id: &SatelliteId,
        provider: &ValidatorAddress,
        consumer_key: Option<PublicKey>,
    ) -> Result<(), SatelliteError> {
        self.require_active(ctx.store(), id)?;
        let store = ctx.store_mut();
        if let Some(key) = consumer_key {
            store.assign_consumer_key(id, provider, &key)?;
        }
        store.set_opted_in(id, provider)
    }

    pub fn opt_out(
        &self,
        ctx: &mut ExecCtx<'_>,
        id: &SatelliteId,
        provider: &ValidatorAddress,
    ) -> Result<(), SatelliteError> {
        self.require_active(ctx.store(), id)?;
        ctx.store_mut().delete_opted_in(id, provider)
    }

    pub fn assign_consumer_key(
        &self,
        ctx: &mut ExecCtx<'_>,
        id: &SatelliteId,
        provider: &ValidatorAddress,
        key: PublicKey,
    ) -> Result<(), SatelliteError> {
        self.require_active(ctx.store(), id)?;
        ctx.store_mut().assign_consumer_key(id, provider, &key)
    }

    pub fn set_commission_rate(
        &self,
        ctx: &mut ExecCtx<'_>,
        id: &SatelliteId,
        provider: &ValidatorAddress,
        rate: &str,
    ) -> Result<(), SatelliteError> {
        self.require_active(ctx.store(), id)?;
        ctx.store_mut().set_commission_rate(id, provider, rate)
    }

    /// Record the channel the relay layer established to a launched chain.
    pub fn set_channel(&self, ctx: &mut ExecCtx<'_>, id: &SatelliteId, channel_id: &str) -> Result<(), SatelliteError> {
        let phase = ctx.store().phase(id)?;
        if phase != Phase::Launched {
            return Err(SatelliteError::invalid_phase(id, phase, &[Phase::Launched]));
        }
        ctx.store_mut().set_channel(id, channel_id)
    }

    // ── Launch and removal ───────────────────────────────────────────────────

    pub fn prepare_for_launch(
        &self,
        ctx: &mut ExecCtx<'_>,
        id: &SatelliteId,
        previous: Timestamp,
        next: Timestamp,
    ) -> Result<(), SatelliteError> {
        LifecycleScheduler::prepare_for_launch(ctx.store_mut(), id, previous, next)
    }

    /// Stop a launched chain and schedule its removal one provider
    /// unbonding period from now.
    pub fn prepare_for_removal(&self, ctx: &mut ExecCtx<'_>, id: &SatelliteId) -> Result<Timestamp, SatelliteError> {
        let phase = ctx.store().phase(id)?;
        ensure_transition(id, phase, Phase::Stopped)?;

        let unbonding = self.collaborators.staking.unbonding_period()?;
        let unbonding_secs = i64::try_from(unbonding.as_secs())
            .map_err(|_| SatelliteError::NoUnbondingTime(format!("unbonding period {unbonding:?} too long")))?;
        let removal_time = ctx.block_time().saturating_add(unbonding_secs);

        ctx.run_isolated(|scoped| {
            let store = scoped.store_mut();
            store.set_phase(id, Phase::Stopped)?;
            store.set_removal_time(id, removal_time)?;
            REMOVAL_QUEUE.append(store, removal_time, id)
        })?;
        info!(satellite_id = %id, removal_time, "satellite stopped; removal scheduled");
        Ok(removal_time)
    }

    pub fn process_due_launches(&self, ctx: &mut ExecCtx<'_>, limit: usize) -> Result<TickReport, SatelliteError> {
        self.scheduler().process_due_launches(ctx, limit)
    }

    pub fn process_due_removals(&self, ctx: &mut ExecCtx<'_>, limit: usize) -> Result<TickReport, SatelliteError> {
        self.scheduler().process_due_removals(ctx, limit)
    }

    /// Run both queues with the configured batch limits. A queue that cannot
    /// be drained is logged and reported as empty; the other still runs.
    pub fn begin_block(&self, ctx: &mut ExecCtx<'_>) -> BlockReport {
        let launches = self
            .process_due_launches(ctx, self.params.spawn_batch_limit)
            .unwrap_or_else(|e| {
                error!(error = %e, "could not drain spawn queue");
                TickReport::default()
            });
        let removals = self
            .process_due_removals(ctx, self.params.removal_batch_limit)
            .unwrap_or_else(|e| {
                error!(error = %e, "could not drain removal queue");
                TickReport::default()
            });
        BlockReport { launches, removals }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn phase<S: KvStore + ?Sized>(&self, store: &S, id: &SatelliteId) -> Result<Phase, SatelliteError> {
        store.phase(id)
    }

    pub fn removal_time<S: KvStore + ?Sized>(&self, store: &S, id: &SatelliteId) -> Result<Timestamp, SatelliteError> {
        store.removal_time(id)
    }
}
