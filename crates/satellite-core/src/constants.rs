/// ─── Satellite Lifecycle Constants ──────────────────────────────────────────

/// Module name attached to every emitted event.
pub const MODULE_NAME: &str = "satellite";

/// Maximum number of satellites launched or removed per tick.
pub const DEFAULT_BATCH_LIMIT: usize = 200;

/// Port the provider side of a satellite channel is bound to.
pub const PROVIDER_PORT_ID: &str = "provider";

/// Fraction of the unbonding period used as the light-client trusting period.
pub const DEFAULT_TRUSTING_PERIOD_FRACTION: &str = "0.66";

/// Default maximum clock drift tolerated by bootstrap clients (seconds).
pub const DEFAULT_MAX_CLOCK_DRIFT_SECS: u64 = 10;

/// Default trust level of bootstrap clients, as numerator/denominator.
pub const DEFAULT_TRUST_LEVEL: (u64, u64) = (1, 3);

/// Retry delay handed to satellites in their bootstrap parameters (seconds).
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 3600;

/// Merkle root placeholder used in bootstrap consensus states.
pub const SENTINEL_ROOT: &[u8] = b"sentinel_root";

/// Client type prefix for client ids handed out by the local client service.
pub const CLIENT_TYPE: &str = "07-tendermint";

// ── Event types and attribute keys ───────────────────────────────────────────

pub const EVENT_CLIENT_CREATED: &str = "satellite_client_created";
pub const EVENT_SATELLITE_DELETED: &str = "satellite_deleted";

pub const ATTR_MODULE: &str = "module";
pub const ATTR_SATELLITE_ID: &str = "satellite_id";
pub const ATTR_CHAIN_ID: &str = "chain_id";
pub const ATTR_CLIENT_ID: &str = "client_id";
pub const ATTR_INITIAL_HEIGHT: &str = "initial_height";
pub const ATTR_TRUSTING_PERIOD: &str = "trusting_period";
pub const ATTR_UNBONDING_PERIOD: &str = "unbonding_period";
pub const ATTR_DELETED_AT: &str = "deleted_at";
