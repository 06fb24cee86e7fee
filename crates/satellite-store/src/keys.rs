//! Key layout of the lifecycle store.
//!
//! Every key starts with a one-byte prefix:
//!
//!   0x01 next id                     → u64 counter
//!   0x02 phase           | id        → phase byte
//!   0x03 chain id        | id        → utf8 chain id
//!   0x04 metadata        | id        → bincode(SatelliteMetadata)
//!   0x05 init params     | id        → bincode(InitializationParameters)
//!   0x06 power shaping   | id        → bincode(PowerShapingParameters)
//!   0x07 client id       | id        → utf8 client id
//!   0x08 genesis         | id        → bincode(SatelliteGenesis)
//!   0x09 spawn queue     | time      → bincode(Vec<String>)
//!   0x0A removal queue   | time      → bincode(Vec<String>)
//!   0x0B removal time    | id        → time bytes
//!   0x0C consumer key    | id | addr → bincode(PublicKey)
//!   0x0D key owner       | id | addr → provider address (consumer addr → provider addr)
//!   0x0E min power top N | id        → u64
//!   0x0F evidence height | id        → u64
//!   0x10 id → channel    | id        → utf8 channel id
//!   0x11 channel → id    | channel   → utf8 satellite id
//!   0x12 commission      | id | addr → utf8 decimal
//!   0x13 allowlist       | id | addr → []
//!   0x14 denylist        | id | addr → []
//!   0x15 opted in        | id | addr → []
//!   0x16 validator set   | id | addr → bincode(ConsensusValidator)
//!   0x17 rewards         | id        → opaque bytes
//!   0x18 init chain ht   | id        → u64
//!   0x19 slash acks      | id        → bincode(Vec<String>)
//!   0x1A pending packets | id        → opaque bytes
//!
//! `id` is encoded as a 4-byte big-endian length followed by the id bytes, so
//! no id's keys are a prefix of another id's keys. `time` is 8 big-endian
//! bytes of the sign-flipped `i64`, so byte order is chronological order.

use satellite_core::error::SatelliteError;
use satellite_core::types::{SatelliteId, Timestamp, ValidatorAddress};

pub const NEXT_ID: u8 = 0x01;
pub const PHASE: u8 = 0x02;
pub const CHAIN_ID: u8 = 0x03;
pub const METADATA: u8 = 0x04;
pub const INIT_PARAMS: u8 = 0x05;
pub const POWER_SHAPING: u8 = 0x06;
pub const CLIENT_ID: u8 = 0x07;
pub const GENESIS: u8 = 0x08;
pub const SPAWN_QUEUE: u8 = 0x09;
pub const REMOVAL_QUEUE: u8 = 0x0A;
pub const REMOVAL_TIME: u8 = 0x0B;
pub const CONSUMER_KEY: u8 = 0x0C;
pub const KEY_OWNER: u8 = 0x0D;
pub const MIN_POWER_TOP_N: u8 = 0x0E;
pub const EVIDENCE_MIN_HEIGHT: u8 = 0x0F;
pub const ID_TO_CHANNEL: u8 = 0x10;
pub const CHANNEL_TO_ID: u8 = 0x11;
pub const COMMISSION_RATE: u8 = 0x12;
pub const ALLOWLIST: u8 = 0x13;
pub const DENYLIST: u8 = 0x14;
pub const OPTED_IN: u8 = 0x15;
pub const VALIDATOR_SET: u8 = 0x16;
pub const REWARDS: u8 = 0x17;
pub const INIT_CHAIN_HEIGHT: u8 = 0x18;
pub const SLASH_ACKS: u8 = 0x19;
pub const PENDING_PACKETS: u8 = 0x1A;

const TIME_SIGN_FLIP: u64 = 1 << 63;

// ── Time encoding ─────────────────────────────────────────────────────────────

pub fn encode_time(ts: Timestamp) -> [u8; 8] {
    ((ts as u64) ^ TIME_SIGN_FLIP).to_be_bytes()
}

pub fn decode_time(bytes: &[u8]) -> Result<Timestamp, SatelliteError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| SatelliteError::MalformedKey(format!("time must be 8 bytes, got {}", bytes.len())))?;
    Ok((u64::from_be_bytes(arr) ^ TIME_SIGN_FLIP) as i64)
}

pub fn time_key(prefix: u8, ts: Timestamp) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(prefix);
    key.extend_from_slice(&encode_time(ts));
    key
}

/// Parse the timestamp out of a queue key written by [`time_key`].
pub fn parse_time_key(prefix: u8, key: &[u8]) -> Result<Timestamp, SatelliteError> {
    match key.split_first() {
        Some((p, rest)) if *p == prefix => decode_time(rest),
        _ => Err(SatelliteError::MalformedKey(format!(
            "expected prefix {prefix:#04x} in key {key:?}"
        ))),
    }
}

// ── Per-satellite keys ────────────────────────────────────────────────────────

pub fn satellite_key(prefix: u8, id: &SatelliteId) -> Vec<u8> {
    let bytes = id.as_bytes();
    let mut key = Vec::with_capacity(5 + bytes.len());
    key.push(prefix);
    key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

/// `prefix | id | validator address`; the per-validator records of a chain
/// all share the [`satellite_key`] prefix.
pub fn validator_key(prefix: u8, id: &SatelliteId, addr: &ValidatorAddress) -> Vec<u8> {
    let mut key = satellite_key(prefix, id);
    key.extend_from_slice(addr.as_bytes());
    key
}

/// Recover the satellite id from a key built by [`satellite_key`].
pub fn parse_satellite_key(prefix: u8, key: &[u8]) -> Result<SatelliteId, SatelliteError> {
    let malformed = || SatelliteError::MalformedKey(format!("bad satellite key {key:?}"));
    let (p, rest) = key.split_first().ok_or_else(malformed)?;
    if *p != prefix || rest.len() < 4 {
        return Err(malformed());
    }
    let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    let id_bytes = rest.get(4..4 + len).ok_or_else(malformed)?;
    let id = String::from_utf8(id_bytes.to_vec()).map_err(|_| malformed())?;
    Ok(SatelliteId(id))
}

/// Recover the validator address suffix from a key built by [`validator_key`].
pub fn parse_validator_suffix(
    prefix: u8,
    id: &SatelliteId,
    key: &[u8],
) -> Result<ValidatorAddress, SatelliteError> {
    let head = satellite_key(prefix, id);
    let suffix = key
        .strip_prefix(head.as_slice())
        .ok_or_else(|| SatelliteError::MalformedKey(format!("key {key:?} not under satellite {id}")))?;
    let arr: [u8; 20] = suffix
        .try_into()
        .map_err(|_| SatelliteError::MalformedKey(format!("bad validator suffix in {key:?}")))?;
    Ok(ValidatorAddress(arr))
}

pub fn channel_key(channel_id: &str) -> Vec<u8> {
    let mut key = vec![CHANNEL_TO_ID];
    key.extend_from_slice(channel_id.as_bytes());
    key
}
