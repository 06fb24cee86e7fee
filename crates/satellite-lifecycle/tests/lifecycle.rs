//! End-to-end lifecycle tests against in-memory collaborators.
//!
//! Run with:
//!   cargo test -p satellite-lifecycle --test lifecycle

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use satellite_core::client::{ChannelState, ClientState, ConsensusState};
use satellite_core::constants::*;
use satellite_core::error::SatelliteError;
use satellite_core::params::{
    InitializationParameters, LifecycleParams, PowerShapingParameters, SatelliteMetadata,
};
use satellite_core::types::{Phase, PublicKey, SatelliteId, Timestamp, ValidatorAddress};
use satellite_core::validator::ProviderValidator;
use satellite_lifecycle::{
    validator_set_hash, BlockHeader, ChannelService, ClientService, Collaborators, ExecCtx,
    Launcher, LifecycleKeeper, LifecycleQuery, SatelliteRecords, SelfConsensusSource,
    SnapshotBuilder, StakingSource, REMOVAL_QUEUE, SPAWN_QUEUE,
};
use satellite_store::keys::{self, satellite_key};
use satellite_store::{ChangeSet, KvStore, MemStore, SledStore};

// ── Fakes ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeClients {
    created: Mutex<Vec<(ClientState, ConsensusState)>>,
    fail: AtomicBool,
}

impl ClientService for FakeClients {
    fn create_client(&self, cs: &ClientState, cons: &ConsensusState) -> Result<String, SatelliteError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SatelliteError::Client("client service unavailable".into()));
        }
        let mut created = self.created.lock().unwrap();
        created.push((cs.clone(), cons.clone()));
        Ok(format!("{CLIENT_TYPE}-{}", created.len() - 1))
    }
}

struct FakeConsensus;

impl SelfConsensusSource for FakeConsensus {
    fn self_consensus_state(&self, height: u64) -> Result<ConsensusState, SatelliteError> {
        Ok(ConsensusState {
            timestamp: height as Timestamp,
            root: height.to_be_bytes().to_vec(),
            next_validators_hash: [7u8; 32],
        })
    }
}

struct FakeStaking {
    bonded: Mutex<Vec<ProviderValidator>>,
    /// Active set; every bonded validator when unset.
    active: Option<Vec<ProviderValidator>>,
    unbonding: Duration,
}

impl StakingSource for FakeStaking {
    fn bonded_validators(&self) -> Result<Vec<ProviderValidator>, SatelliteError> {
        Ok(self.bonded.lock().unwrap().clone())
    }

    fn active_validators(&self) -> Result<Vec<ProviderValidator>, SatelliteError> {
        match &self.active {
            Some(active) => Ok(active.clone()),
            None => Ok(self.bonded.lock().unwrap().clone()),
        }
    }

    fn unbonding_period(&self) -> Result<Duration, SatelliteError> {
        Ok(self.unbonding)
    }
}

#[derive(Default)]
struct FakeChannels {
    states: Mutex<HashMap<String, ChannelState>>,
    closed: Mutex<Vec<String>>,
}

impl ChannelService for FakeChannels {
    fn channel(&self, _port_id: &str, channel_id: &str) -> Option<ChannelState> {
        self.states.lock().unwrap().get(channel_id).copied()
    }

    fn close_channel(&self, channel_id: &str) -> Result<(), SatelliteError> {
        self.closed.lock().unwrap().push(channel_id.to_string());
        self.states
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), ChannelState::Closed);
        Ok(())
    }
}

/// Memory store that can refuse writes to the removal queue. Change sets are
/// applied all or nothing, as a sled batch is.
#[derive(Default)]
struct GuardedStore {
    inner: MemStore,
    reject_removals: bool,
}

impl GuardedStore {
    fn check(&self, key: &[u8]) -> Result<(), SatelliteError> {
        if self.reject_removals && key.first() == Some(&keys::REMOVAL_QUEUE) {
            return Err(SatelliteError::Storage("removal queue is read-only".into()));
        }
        Ok(())
    }
}

impl KvStore for GuardedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SatelliteError> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), SatelliteError> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), SatelliteError> {
        self.check(key)?;
        self.inner.delete(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, SatelliteError> {
        self.inner.scan_prefix(prefix)
    }

    fn apply(&mut self, changes: ChangeSet) -> Result<(), SatelliteError> {
        for key in changes.writes.keys() {
            self.check(key)?;
        }
        self.inner.apply(changes)
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

const UNBONDING_SECS: u64 = 3_600;

struct Harness {
    store: MemStore,
    keeper: LifecycleKeeper,
    clients: Arc<FakeClients>,
    channels: Arc<FakeChannels>,
}

fn pv(b: u8, power: u64) -> ProviderValidator {
    ProviderValidator {
        address: addr(b),
        consensus_key: PublicKey([b; 32]),
        power,
        tokens: power * 1_000,
    }
}

fn addr(b: u8) -> ValidatorAddress {
    ValidatorAddress([b; 20])
}

fn header(height: u64, time: Timestamp) -> BlockHeader {
    BlockHeader {
        chain_id: "provider-1".into(),
        height,
        time,
    }
}

fn collaborators(validators: Vec<ProviderValidator>) -> (Collaborators, Arc<FakeClients>, Arc<FakeChannels>) {
    let clients = Arc::new(FakeClients::default());
    let channels = Arc::new(FakeChannels::default());
    let collab = Collaborators {
        clients: clients.clone(),
        consensus: Arc::new(FakeConsensus),
        staking: Arc::new(FakeStaking {
            bonded: Mutex::new(validators),
            active: None,
            unbonding: Duration::from_secs(UNBONDING_SECS),
        }),
        channels: channels.clone(),
    };
    (collab, clients, channels)
}

impl Harness {
    fn new() -> Self {
        let (collab, clients, channels) = collaborators(vec![pv(1, 50), pv(2, 30), pv(3, 20)]);
        Self {
            store: MemStore::new(),
            keeper: LifecycleKeeper::new(LifecycleParams::default(), collab).unwrap(),
            clients,
            channels,
        }
    }

    /// Register `chain_id` with spawn time `spawn` and validators 1 and 2 opted in.
    fn register(&mut self, chain_id: &str, spawn: Timestamp, opt_in: bool) -> SatelliteId {
        self.register_with(chain_id, spawn, opt_in, PowerShapingParameters::default())
    }

    fn register_with(
        &mut self,
        chain_id: &str,
        spawn: Timestamp,
        opt_in: bool,
        shaping: PowerShapingParameters,
    ) -> SatelliteId {
        let keeper = &self.keeper;
        let mut ctx = ExecCtx::new(&mut self.store, header(1, 10));
        let id = keeper
            .register(
                &mut ctx,
                chain_id,
                SatelliteMetadata {
                    name: chain_id.to_string(),
                    ..Default::default()
                },
                Some(InitializationParameters {
                    spawn_time: spawn,
                    ..Default::default()
                }),
                shaping,
            )
            .unwrap();
        if opt_in {
            keeper.opt_in(&mut ctx, &id, &addr(1), None).unwrap();
            keeper.opt_in(&mut ctx, &id, &addr(2), None).unwrap();
        }
        id
    }

    fn phase(&self, id: &SatelliteId) -> Phase {
        self.keeper.phase(&self.store, id).unwrap()
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn chain_launches_once_spawn_time_passes() {
    let mut h = Harness::new();
    let spawn = 1_000;
    let id = h.register("chain-1", spawn, true);
    let keeper = &h.keeper;

    let mut ctx = ExecCtx::new(&mut h.store, header(2, 500));
    assert_eq!(keeper.initialize(&mut ctx, &id), (spawn, true));

    let early = keeper.process_due_launches(&mut ctx, 200).unwrap();
    assert!(early.is_empty());
    assert!(ctx.events().is_empty());
    assert_eq!(h.phase(&id), Phase::Initialized);

    let mut ctx = ExecCtx::new(&mut h.store, header(3, spawn + 1));
    let report = keeper.process_due_launches(&mut ctx, 200).unwrap();
    assert_eq!(report.succeeded, vec![id.clone()]);
    let events = ctx.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EVENT_CLIENT_CREATED);
    assert_eq!(events[0].attribute(ATTR_CHAIN_ID), Some("chain-1"));
    assert_eq!(events[0].attribute(ATTR_CLIENT_ID), Some("07-tendermint-0"));
    assert_eq!(events[0].attribute(ATTR_SATELLITE_ID), Some(id.as_str()));

    assert_eq!(h.phase(&id), Phase::Launched);
    let query = LifecycleQuery::new(&h.store);
    assert_eq!(query.client_id(&id).unwrap().as_deref(), Some("07-tendermint-0"));
    assert!(query.pending_launches().unwrap().is_empty());

    let genesis = query.genesis(&id).unwrap().unwrap();
    assert_eq!(genesis.provider.initial_val_set.len(), 2);
    assert!(genesis.provider.initial_val_set.iter().all(|u| u.power > 0));
    assert_eq!(genesis.provider.client_state.chain_id, "provider-1");
    assert_eq!(genesis.provider.client_state.latest_height.revision_number, 1);
    assert_eq!(genesis.provider.client_state.latest_height.revision_height, 3);

    // The client tracking the satellite commits to the genesis validator set.
    let created = h.clients.created.lock().unwrap();
    let (client_state, consensus_state) = &created[0];
    assert_eq!(client_state.chain_id, "chain-1");
    assert_eq!(
        consensus_state.next_validators_hash,
        validator_set_hash(&genesis.provider.initial_val_set).unwrap()
    );
    assert_eq!(consensus_state.root, SENTINEL_ROOT.to_vec());
    assert_eq!(h.store.equivocation_evidence_min_height(&id).unwrap(), Some(1));
    assert_eq!(h.store.init_chain_height(&id).unwrap(), Some(3));
}

#[test]
fn chain_without_validators_stays_initialized() {
    let mut h = Harness::new();
    let id = h.register("lonely-1", 100, false);
    let keeper = &h.keeper;

    for (height, time) in [(2, 101), (3, 200)] {
        let mut ctx = ExecCtx::new(&mut h.store, header(height, time));
        let report = keeper.process_due_launches(&mut ctx, 200).unwrap();
        assert_eq!(report.requeued, vec![id.clone()]);
        assert!(ctx.events().is_empty());
        assert_eq!(h.phase(&id), Phase::Initialized);
        // Retried at the block time, not at the original spawn time.
        assert_eq!(SPAWN_QUEUE.buckets(&h.store).unwrap(), vec![(time, vec![id.clone()])]);
        assert!(h.store.genesis(&id).unwrap().is_none());
        assert!(h.store.client_id(&id).unwrap().is_none());
    }
    assert!(h.clients.created.lock().unwrap().is_empty());

    // Once a validator opts in, the next tick launches the chain.
    let mut ctx = ExecCtx::new(&mut h.store, header(4, 300));
    keeper.opt_in(&mut ctx, &id, &addr(3), None).unwrap();
    let report = keeper.process_due_launches(&mut ctx, 200).unwrap();
    assert_eq!(report.succeeded, vec![id.clone()]);
    assert_eq!(h.phase(&id), Phase::Launched);
}

#[test]
fn failed_client_creation_leaves_no_trace() {
    let mut h = Harness::new();
    let id = h.register("chain-1", 100, true);
    h.clients.fail.store(true, Ordering::SeqCst);

    let before = h.store.clone();
    let keeper = &h.keeper;
    let mut ctx = ExecCtx::new(&mut h.store, header(2, 150));
    let report = keeper.process_due_launches(&mut ctx, 200).unwrap();
    assert_eq!(report.requeued, vec![id.clone()]);
    assert!(ctx.events().is_empty());
    // Only the queue entry moved, from the spawn time to the block time.
    let mut expected = before;
    SPAWN_QUEUE.remove(&mut expected, 100, &id).unwrap();
    SPAWN_QUEUE.append(&mut expected, 150, &id).unwrap();
    assert_eq!(h.store, expected);
}

#[test]
fn retried_chain_does_not_starve_later_spawns() {
    let mut h = Harness::new();
    let bad = h.register("bad-1", 100, false);
    let good = h.register("good-1", 200, true);
    let keeper = &h.keeper;

    let mut ctx = ExecCtx::new(&mut h.store, header(2, 300));
    let first = keeper.process_due_launches(&mut ctx, 1).unwrap();
    assert_eq!(first.requeued, vec![bad.clone()]);

    let mut ctx = ExecCtx::new(&mut h.store, header(3, 301));
    let second = keeper.process_due_launches(&mut ctx, 1).unwrap();
    assert_eq!(second.succeeded, vec![good.clone()]);
    assert_eq!(h.phase(&good), Phase::Launched);
    assert_eq!(h.phase(&bad), Phase::Initialized);

    // The failing chain keeps cycling through the queue on its own.
    let mut ctx = ExecCtx::new(&mut h.store, header(4, 302));
    assert_eq!(keeper.process_due_launches(&mut ctx, 1).unwrap().requeued, vec![bad.clone()]);
    let query = LifecycleQuery::new(&h.store);
    assert_eq!(query.pending_launches().unwrap(), vec![(302, vec![bad])]);
}

#[test]
fn launch_in_wrong_phase_mutates_nothing() {
    let mut h = Harness::new();
    let keeper = &h.keeper;
    let mut ctx = ExecCtx::new(&mut h.store, header(1, 10));
    let id = keeper
        .register(
            &mut ctx,
            "chain-1",
            SatelliteMetadata::default(),
            None,
            PowerShapingParameters::default(),
        )
        .unwrap();
    keeper.opt_in(&mut ctx, &id, &addr(1), None).unwrap();

    let before = h.store.clone();
    let launcher = Launcher::new(h.keeper.params(), h.keeper.collaborators());
    let mut ctx = ExecCtx::new(&mut h.store, header(2, 20));
    let err = launcher.launch(&mut ctx, &id).unwrap_err();
    assert!(matches!(
        err,
        SatelliteError::InvalidPhase {
            current: Phase::Registered,
            ..
        }
    ));
    assert!(ctx.events().is_empty());
    assert_eq!(h.store, before);
}

#[test]
fn rescheduling_moves_the_spawn() {
    let mut h = Harness::new();
    let id = h.register("chain-1", 100, true);
    let keeper = &h.keeper;

    let mut ctx = ExecCtx::new(&mut h.store, header(2, 50));
    keeper
        .update_initialization(
            &mut ctx,
            &id,
            InitializationParameters {
                spawn_time: 400,
                ..Default::default()
            },
        )
        .unwrap();

    let query = LifecycleQuery::new(&h.store);
    assert_eq!(query.pending_launches().unwrap(), vec![(400, vec![id.clone()])]);
    assert_eq!(h.phase(&id), Phase::Initialized);

    let mut ctx = ExecCtx::new(&mut h.store, header(3, 399));
    assert!(keeper.process_due_launches(&mut ctx, 200).unwrap().is_empty());
    let mut ctx = ExecCtx::new(&mut h.store, header(4, 400));
    assert_eq!(keeper.process_due_launches(&mut ctx, 200).unwrap().succeeded, vec![id]);
}

#[test]
fn unusable_initialization_is_rejected_up_front() {
    let mut h = Harness::new();
    let before = h.store.clone();
    {
        let keeper = &h.keeper;
        let mut ctx = ExecCtx::new(&mut h.store, header(1, 10));
        for unbonding_period in [Duration::ZERO, Duration::from_nanos(1)] {
            let err = keeper
                .register(
                    &mut ctx,
                    "zero-1",
                    SatelliteMetadata::default(),
                    Some(InitializationParameters {
                        spawn_time: 100,
                        unbonding_period,
                        ..Default::default()
                    }),
                    PowerShapingParameters::default(),
                )
                .unwrap_err();
            assert!(matches!(err, SatelliteError::InvalidInitialization(_)), "{err}");
        }
    }
    assert_eq!(h.store, before);

    let id = h.register("chain-1", 100, true);
    let keeper = &h.keeper;
    let mut ctx = ExecCtx::new(&mut h.store, header(2, 50));
    let err = keeper
        .update_initialization(
            &mut ctx,
            &id,
            InitializationParameters {
                spawn_time: 400,
                redistribution_fraction: "2".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, SatelliteError::InvalidInitialization(_)));
    let query = LifecycleQuery::new(&h.store);
    assert_eq!(query.pending_launches().unwrap(), vec![(100, vec![id])]);
}

#[test]
fn rescheduling_follows_a_retried_or_lost_entry() {
    let mut h = Harness::new();
    let id = h.register("lonely-1", 100, false);
    let keeper = &h.keeper;
    let reschedule = |spawn_time| InitializationParameters {
        spawn_time,
        ..Default::default()
    };

    // The failed launch moved the entry to 150.
    let mut ctx = ExecCtx::new(&mut h.store, header(2, 150));
    assert_eq!(keeper.process_due_launches(&mut ctx, 200).unwrap().requeued, vec![id.clone()]);
    keeper.update_initialization(&mut ctx, &id, reschedule(400)).unwrap();
    assert_eq!(
        LifecycleQuery::new(&h.store).pending_launches().unwrap(),
        vec![(400, vec![id.clone()])]
    );

    // With no entry left at all, the chain is queued again.
    SPAWN_QUEUE.remove(&mut h.store, 400, &id).unwrap();
    let mut ctx = ExecCtx::new(&mut h.store, header(3, 160));
    keeper.update_initialization(&mut ctx, &id, reschedule(500)).unwrap();
    assert_eq!(
        LifecycleQuery::new(&h.store).pending_launches().unwrap(),
        vec![(500, vec![id.clone()])]
    );
    assert_eq!(h.phase(&id), Phase::Initialized);
}

#[test]
fn update_after_launch_is_rejected() {
    let mut h = Harness::new();
    let id = h.register("chain-1", 100, true);
    let keeper = &h.keeper;
    let mut ctx = ExecCtx::new(&mut h.store, header(2, 100));
    keeper.process_due_launches(&mut ctx, 200).unwrap();

    let err = keeper
        .update_initialization(&mut ctx, &id, InitializationParameters::default())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("satellite {id} is in phase launched, requires registered or initialized")
    );
}

#[test]
fn batch_limit_defers_rest_of_bucket() {
    let mut h = Harness::new();
    let ids: Vec<_> = ["a-1", "b-1", "c-1"]
        .into_iter()
        .map(|c| h.register(c, 100, true))
        .collect();
    let keeper = &h.keeper;

    let mut ctx = ExecCtx::new(&mut h.store, header(2, 100));
    let first = keeper.process_due_launches(&mut ctx, 2).unwrap();
    assert_eq!(first.succeeded.len(), 2);
    let left = SPAWN_QUEUE.ids_at(&h.store, 100).unwrap();
    assert_eq!(left.len(), 1);

    let mut ctx = ExecCtx::new(&mut h.store, header(3, 101));
    let second = keeper.process_due_launches(&mut ctx, 2).unwrap();
    assert_eq!(second.succeeded, left);
    for id in &ids {
        assert_eq!(h.phase(id), Phase::Launched);
    }
}

/// Records a removal must purge. Every one of them is present on a chain
/// built by [`launched_and_stopped`].
const PURGED: [u8; 17] = [
    keys::CLIENT_ID,
    keys::GENESIS,
    keys::REMOVAL_TIME,
    keys::CONSUMER_KEY,
    keys::KEY_OWNER,
    keys::MIN_POWER_TOP_N,
    keys::EVIDENCE_MIN_HEIGHT,
    keys::ID_TO_CHANNEL,
    keys::COMMISSION_RATE,
    keys::ALLOWLIST,
    keys::DENYLIST,
    keys::OPTED_IN,
    keys::VALIDATOR_SET,
    keys::REWARDS,
    keys::INIT_CHAIN_HEIGHT,
    keys::SLASH_ACKS,
    keys::PENDING_PACKETS,
];

/// Launch `chain-1` with top-N, an allowlist and a denylist, attach a channel
/// and some bookkeeping, then stop it.
fn launched_and_stopped(h: &mut Harness, stop_at: Timestamp) -> SatelliteId {
    let shaping = PowerShapingParameters {
        top_n: 50,
        allowlist: vec![addr(1), addr(2)],
        denylist: vec![addr(3)],
        ..Default::default()
    };
    let id = h.register_with("chain-1", 100, true, shaping);
    let keeper = &h.keeper;
    let mut ctx = ExecCtx::new(&mut h.store, header(2, 100));
    keeper.process_due_launches(&mut ctx, 200).unwrap();

    keeper.set_channel(&mut ctx, &id, "channel-0").unwrap();
    h.channels
        .states
        .lock()
        .unwrap()
        .insert("channel-0".into(), ChannelState::Open);
    keeper.assign_consumer_key(&mut ctx, &id, &addr(2), PublicKey([0xbb; 32])).unwrap();
    keeper.set_commission_rate(&mut ctx, &id, &addr(1), "0.05").unwrap();
    let store = ctx.store_mut();
    store.set_rewards_allocation(&id, b"rewards").unwrap();
    store.append_slash_ack(&id, "cosmosvalcons1xyz").unwrap();
    store.set_pending_packets(&id, b"packets").unwrap();

    let mut ctx = ExecCtx::new(&mut h.store, header(3, stop_at));
    let removal = keeper.prepare_for_removal(&mut ctx, &id).unwrap();
    assert_eq!(removal, stop_at + UNBONDING_SECS as Timestamp);

    for prefix in PURGED {
        assert!(
            !h.store.scan_prefix(&satellite_key(prefix, &id)).unwrap().is_empty(),
            "prefix {prefix:#04x} missing before removal"
        );
    }
    assert_eq!(h.store.min_power_in_top_n(&id).unwrap(), Some(50));
    id
}

#[test]
fn removal_waits_for_unbonding_then_purges() {
    let mut h = Harness::new();
    let stop_at = 1_000;
    let id = launched_and_stopped(&mut h, stop_at);
    let removal = stop_at + UNBONDING_SECS as Timestamp;
    assert_eq!(h.phase(&id), Phase::Stopped);
    assert_eq!(h.keeper.removal_time(&h.store, &id).unwrap(), removal);

    let keeper = &h.keeper;
    let mut ctx = ExecCtx::new(&mut h.store, header(4, removal - 1));
    assert!(keeper.process_due_removals(&mut ctx, 200).unwrap().is_empty());
    assert_eq!(h.phase(&id), Phase::Stopped);

    let mut ctx = ExecCtx::new(&mut h.store, header(5, removal));
    let report = keeper.process_due_removals(&mut ctx, 200).unwrap();
    assert_eq!(report.succeeded, vec![id.clone()]);
    let events = ctx.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EVENT_SATELLITE_DELETED);
    assert_eq!(h.phase(&id), Phase::Deleted);
    assert_eq!(*h.channels.closed.lock().unwrap(), vec!["channel-0".to_string()]);

    for prefix in PURGED {
        assert!(
            h.store.scan_prefix(&satellite_key(prefix, &id)).unwrap().is_empty(),
            "prefix {prefix:#04x} not purged"
        );
    }
    assert!(h.store.satellite_by_channel("channel-0").unwrap().is_none());

    let retained = [
        keys::PHASE,
        keys::CHAIN_ID,
        keys::METADATA,
        keys::INIT_PARAMS,
        keys::POWER_SHAPING,
    ];
    for prefix in retained {
        assert!(
            h.store.has(&satellite_key(prefix, &id)).unwrap(),
            "prefix {prefix:#04x} not retained"
        );
    }
    assert_eq!(h.store.chain_id(&id).unwrap(), "chain-1");
    let query = LifecycleQuery::new(&h.store);
    assert!(query.pending_removals().unwrap().is_empty());
    assert!(query.describe(&id, removal).unwrap().ends_with("deleted"));
}

#[test]
fn corrupt_key_assignments_abort_teardown() {
    let mut h = Harness::new();
    let id = launched_and_stopped(&mut h, 1_000);
    let removal = 1_000 + UNBONDING_SECS as Timestamp;

    // Drop the reverse record of validator 2's assigned key.
    let consumer_addr = PublicKey([0xbb; 32]).address();
    h.store
        .delete(&keys::validator_key(keys::KEY_OWNER, &id, &consumer_addr))
        .unwrap();

    let before = h.store.clone();
    let keeper = &h.keeper;
    let mut ctx = ExecCtx::new(&mut h.store, header(4, removal));
    let report = keeper.process_due_removals(&mut ctx, 200).unwrap();
    assert_eq!(report.dropped, vec![id.clone()]);
    assert!(ctx.events().is_empty());

    assert_eq!(h.phase(&id), Phase::Stopped);
    assert!(h.store.client_id(&id).unwrap().is_some());
    // Only the removal-queue bucket went away.
    let mut expected = before;
    expected.delete(&keys::time_key(keys::REMOVAL_QUEUE, removal)).unwrap();
    assert_eq!(h.store, expected);
}

#[test]
fn stop_requires_launched_chain() {
    let mut h = Harness::new();
    let id = h.register("chain-1", 100, true);
    let keeper = &h.keeper;
    let mut ctx = ExecCtx::new(&mut h.store, header(2, 50));
    let err = keeper.prepare_for_removal(&mut ctx, &id).unwrap_err();
    assert!(matches!(err, SatelliteError::InvalidPhase { current: Phase::Initialized, .. }));
    assert!(keeper.removal_time(ctx.store(), &id).is_err());
}

#[test]
fn failed_stop_leaves_chain_launched() {
    let (collab, _, _) = collaborators(vec![pv(1, 10)]);
    let keeper = LifecycleKeeper::new(LifecycleParams::default(), collab).unwrap();
    let mut store = GuardedStore::default();

    let mut ctx = ExecCtx::new(&mut store, header(1, 10));
    let id = keeper
        .register(
            &mut ctx,
            "guarded-1",
            SatelliteMetadata::default(),
            Some(InitializationParameters {
                spawn_time: 20,
                ..Default::default()
            }),
            PowerShapingParameters::default(),
        )
        .unwrap();
    keeper.opt_in(&mut ctx, &id, &addr(1), None).unwrap();
    let mut ctx = ExecCtx::new(&mut store, header(2, 20));
    assert_eq!(keeper.begin_block(&mut ctx).launches.succeeded, vec![id.clone()]);

    store.reject_removals = true;
    let before = store.inner.clone();
    let mut ctx = ExecCtx::new(&mut store, header(3, 30));
    let err = keeper.prepare_for_removal(&mut ctx, &id).unwrap_err();
    assert!(matches!(err, SatelliteError::Storage(_)));

    assert_eq!(store.inner, before);
    assert_eq!(keeper.phase(&store, &id).unwrap(), Phase::Launched);
    assert!(keeper.removal_time(&store, &id).is_err());
    assert!(REMOVAL_QUEUE.buckets(&store).unwrap().is_empty());
}

#[test]
fn snapshot_is_deterministic() {
    let validators = vec![pv(1, 50), pv(2, 30), pv(3, 20), pv(4, 20), pv(5, 1)];
    let params = LifecycleParams::default();

    let mut hashes = Vec::new();
    let mut geneses = Vec::new();
    for _ in 0..2 {
        let (collab, _, _) = collaborators(validators.clone());
        let keeper = LifecycleKeeper::new(params.clone(), collab.clone()).unwrap();
        let mut store = MemStore::new();
        let mut ctx = ExecCtx::new(&mut store, header(7, 70));
        let id = keeper
            .register(
                &mut ctx,
                "topn-1",
                SatelliteMetadata::default(),
                Some(InitializationParameters {
                    spawn_time: 100,
                    ..Default::default()
                }),
                PowerShapingParameters {
                    top_n: 80,
                    ..Default::default()
                },
            )
            .unwrap();
        let snapshot = SnapshotBuilder::new(&params, &collab).build(&mut ctx, &id).unwrap();
        // 50 + 30 < 80% of 121; the two validators at 20 both make the cut.
        assert_eq!(snapshot.validators.len(), 4);
        assert_eq!(store.min_power_in_top_n(&id).unwrap(), Some(20));
        hashes.push(snapshot.validator_set_hash);
        geneses.push(snapshot.genesis);
    }
    assert_eq!(hashes[0], hashes[1]);
    assert_eq!(geneses[0], geneses[1]);
}

#[test]
fn lifecycle_runs_on_sled() {
    let (collab, _, _) = collaborators(vec![pv(1, 10)]);
    let keeper = LifecycleKeeper::new(LifecycleParams::default(), collab).unwrap();
    let mut store = SledStore::temporary().unwrap();

    let mut ctx = ExecCtx::new(&mut store, header(1, 10));
    let id = keeper
        .register(
            &mut ctx,
            "sled-1",
            SatelliteMetadata::default(),
            Some(InitializationParameters {
                spawn_time: 20,
                ..Default::default()
            }),
            PowerShapingParameters::default(),
        )
        .unwrap();
    keeper.opt_in(&mut ctx, &id, &addr(1), None).unwrap();

    let mut ctx = ExecCtx::new(&mut store, header(2, 20));
    let report = keeper.begin_block(&mut ctx);
    assert_eq!(report.launches.succeeded, vec![id.clone()]);
    assert!(report.removals.is_empty());
    assert_eq!(keeper.phase(&store, &id).unwrap(), Phase::Launched);
}

#[test]
fn inactive_provider_validators_are_left_out() {
    let bonded = vec![pv(1, 50), pv(2, 30)];
    let params = LifecycleParams::default();

    for (allow_inactive_vals, expected) in [(false, 1), (true, 2)] {
        let (mut collab, _, _) = collaborators(bonded.clone());
        let staking: Arc<dyn StakingSource> = Arc::new(FakeStaking {
            bonded: Mutex::new(bonded.clone()),
            active: Some(vec![pv(1, 50)]),
            unbonding: Duration::from_secs(UNBONDING_SECS),
        });
        collab.staking = staking;
        let keeper = LifecycleKeeper::new(params.clone(), collab.clone()).unwrap();
        let mut store = MemStore::new();
        let mut ctx = ExecCtx::new(&mut store, header(1, 10));
        let id = keeper
            .register(
                &mut ctx,
                "inactive-1",
                SatelliteMetadata::default(),
                Some(InitializationParameters {
                    spawn_time: 100,
                    ..Default::default()
                }),
                PowerShapingParameters {
                    allow_inactive_vals,
                    ..Default::default()
                },
            )
            .unwrap();
        keeper.opt_in(&mut ctx, &id, &addr(1), None).unwrap();
        keeper.opt_in(&mut ctx, &id, &addr(2), None).unwrap();

        let snapshot = SnapshotBuilder::new(&params, &collab).build(&mut ctx, &id).unwrap();
        assert_eq!(snapshot.validators.len(), expected, "allow_inactive_vals = {allow_inactive_vals}");
        assert_eq!(snapshot.validators[0].provider_address, addr(1));
    }
}
