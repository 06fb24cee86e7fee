use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp (seconds, UTC). `0` is the "never scheduled" value.
pub type Timestamp = i64;

/// Zero value for a timestamp that was never set.
pub const ZERO_TIME: Timestamp = 0;

/// Voting power of a validator.
pub type Power = u64;

// ── SatelliteId ──────────────────────────────────────────────────────────────

/// Opaque identifier assigned to a satellite chain at registration.
///
/// Identifiers are allocated from a monotonically increasing counter and are
/// never reused, even after the chain is deleted.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SatelliteId(pub String);

impl SatelliteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SatelliteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SatelliteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SatelliteId({})", self.0)
    }
}

impl From<&str> for SatelliteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Height ───────────────────────────────────────────────────────────────────

/// Revisioned block height, as tracked by light clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Height {
    pub revision_number: u64,
    pub revision_height: u64,
}

impl Height {
    pub fn new(revision_number: u64, revision_height: u64) -> Self {
        Self { revision_number, revision_height }
    }

    pub fn is_zero(&self) -> bool {
        self.revision_number == 0 && self.revision_height == 0
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.revision_number, self.revision_height)
    }
}

// ── ValidatorAddress ─────────────────────────────────────────────────────────

/// 20-byte consensus address of a validator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatorAddress(pub [u8; 20]);

impl ValidatorAddress {
    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorAddress({}…)", &self.to_hex()[..8])
    }
}

// ── PublicKey ────────────────────────────────────────────────────────────────

/// 32-byte consensus public key (ed25519).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Consensus address: first 20 bytes of BLAKE3(public key).
    pub fn address(&self) -> ValidatorAddress {
        let hash = blake3::hash(&self.0);
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&hash.as_bytes()[..20]);
        ValidatorAddress(arr)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}…)", &self.to_hex()[..8])
    }
}

// ── Phase ────────────────────────────────────────────────────────────────────

/// Lifecycle phase of a satellite chain.
///
/// ```text
/// Registered --(positive spawn time set)--> Initialized
/// Initialized --(spawn time due, non-empty valset)--> Launched
/// Launched --(stop requested)--> Stopped
/// Stopped --(unbonding delay elapsed)--> Deleted   [terminal]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Phase {
    /// No phase recorded for this id.
    Unspecified = 0,
    Registered = 1,
    Initialized = 2,
    Launched = 3,
    Stopped = 4,
    Deleted = 5,
}

/// Every allowed `(from, to)` pair. Initialized → Initialized is the
/// re-initialization that moves the spawn time before launch.
pub const PHASE_TRANSITIONS: &[(Phase, Phase)] = &[
    (Phase::Unspecified, Phase::Registered),
    (Phase::Registered, Phase::Initialized),
    (Phase::Initialized, Phase::Initialized),
    (Phase::Initialized, Phase::Launched),
    (Phase::Launched, Phase::Stopped),
    (Phase::Stopped, Phase::Deleted),
];

impl Phase {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Phase::Unspecified),
            1 => Some(Phase::Registered),
            2 => Some(Phase::Initialized),
            3 => Some(Phase::Launched),
            4 => Some(Phase::Stopped),
            5 => Some(Phase::Deleted),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        PHASE_TRANSITIONS.contains(&(self, next))
    }

    /// Phases from which `target` may be entered.
    pub fn sources_of(target: Phase) -> Vec<Phase> {
        PHASE_TRANSITIONS
            .iter()
            .filter(|(_, to)| *to == target)
            .map(|(from, _)| *from)
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Deleted
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Unspecified => "unspecified",
            Phase::Registered => "registered",
            Phase::Initialized => "initialized",
            Phase::Launched => "launched",
            Phase::Stopped => "stopped",
            Phase::Deleted => "deleted",
        };
        f.write_str(s)
    }
}
