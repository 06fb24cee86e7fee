use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BATCH_LIMIT, DEFAULT_MAX_CLOCK_DRIFT_SECS, DEFAULT_TRUSTING_PERIOD_FRACTION,
    DEFAULT_TRUST_LEVEL, PROVIDER_PORT_ID,
};
use crate::error::SatelliteError;
use crate::types::{Height, Timestamp, ValidatorAddress, ZERO_TIME};

/// Descriptive metadata. Retained after deletion for historical lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteMetadata {
    pub name: String,
    pub description: String,
    pub metadata: String,
}

/// Parameters a satellite chain is bootstrapped with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationParameters {
    /// First height of the satellite chain.
    pub initial_height: Height,
    pub genesis_hash: Vec<u8>,
    pub binary_hash: Vec<u8>,
    /// Time at which the satellite is launched. `0` means unset.
    pub spawn_time: Timestamp,
    /// Unbonding period of the satellite chain itself.
    pub unbonding_period: Duration,
    pub ccv_timeout_period: Duration,
    pub transfer_timeout_period: Duration,
    /// Decimal string, e.g. "0.75".
    pub redistribution_fraction: String,
    pub blocks_per_distribution_transmission: i64,
    pub historical_entries: i64,
    pub distribution_transmission_channel: String,
}

impl Default for InitializationParameters {
    fn default() -> Self {
        Self {
            initial_height: Height::new(0, 1),
            genesis_hash: Vec::new(),
            binary_hash: Vec::new(),
            spawn_time: ZERO_TIME,
            unbonding_period: Duration::from_secs(21 * 24 * 3600),
            ccv_timeout_period: Duration::from_secs(28 * 24 * 3600),
            transfer_timeout_period: Duration::from_secs(3600),
            redistribution_fraction: "0.75".to_string(),
            blocks_per_distribution_transmission: 1000,
            historical_entries: 10_000,
            distribution_transmission_channel: String::new(),
        }
    }
}

impl InitializationParameters {
    pub fn validate(&self) -> Result<(), SatelliteError> {
        let bad = |msg: String| Err(SatelliteError::InvalidInitialization(msg));
        if self.initial_height.is_zero() {
            return bad("initial height must not be zero".into());
        }
        for (name, period) in [
            ("unbonding_period", self.unbonding_period),
            ("ccv_timeout_period", self.ccv_timeout_period),
            ("transfer_timeout_period", self.transfer_timeout_period),
        ] {
            if period.is_zero() {
                return bad(format!("{name} must be positive"));
            }
        }
        if let Err(e) = self.redistribution_fraction.parse::<Fraction>() {
            return bad(format!("redistribution fraction: {e}"));
        }
        if self.blocks_per_distribution_transmission <= 0 {
            return bad(format!(
                "blocks_per_distribution_transmission must be positive, got {}",
                self.blocks_per_distribution_transmission
            ));
        }
        if self.historical_entries <= 0 {
            return bad(format!(
                "historical_entries must be positive, got {}",
                self.historical_entries
            ));
        }
        Ok(())
    }
}

/// Controls which provider validators secure a satellite and with what power.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerShapingParameters {
    /// Percentage (0..=100) of active power that is automatically opted in.
    /// `0` makes the chain opt-in only.
    pub top_n: u32,
    /// Maximum percentage of total power any single validator may hold. `0` = no cap.
    pub validators_power_cap: u32,
    /// Maximum number of validators. `0` = no cap.
    pub validator_set_cap: u32,
    pub allowlist: Vec<ValidatorAddress>,
    pub denylist: Vec<ValidatorAddress>,
    /// Minimum bonded tokens a validator needs to validate this chain.
    pub min_stake: u64,
    /// Whether bonded-but-inactive provider validators may validate.
    pub allow_inactive_vals: bool,
}

impl PowerShapingParameters {
    pub fn validate(&self) -> Result<(), SatelliteError> {
        if self.top_n > 100 {
            return Err(SatelliteError::InvalidPowerShaping(format!(
                "top_n must be in 0..=100, got {}",
                self.top_n
            )));
        }
        if self.top_n > 0 && self.top_n < 50 {
            return Err(SatelliteError::InvalidPowerShaping(format!(
                "top_n must be 0 or in 50..=100, got {}",
                self.top_n
            )));
        }
        if self.validators_power_cap > 100 {
            return Err(SatelliteError::InvalidPowerShaping(format!(
                "validators_power_cap must be in 0..=100, got {}",
                self.validators_power_cap
            )));
        }
        Ok(())
    }
}

/// A decimal fraction in (0, 1], parsed from a string such as "0.66".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u128,
    pub denominator: u128,
}

impl FromStr for Fraction {
    type Err = SatelliteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SatelliteError::InvalidTrustPeriod(format!("invalid fraction: {s:?}"));
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
            || frac_part.len() > 18
        {
            return Err(bad());
        }
        let denominator = 10u128.pow(frac_part.len() as u32);
        let int_value: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| bad())?
        };
        let frac_value: u128 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse().map_err(|_| bad())?
        };
        let numerator = int_value
            .checked_mul(denominator)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(bad)?;
        if numerator == 0 || numerator > denominator {
            return Err(SatelliteError::InvalidTrustPeriod(format!(
                "fraction {s} must lie in (0, 1]"
            )));
        }
        Ok(Self { numerator, denominator })
    }
}

/// Trusting period = `fraction` × `unbonding_period`, truncated to whole
/// nanoseconds. Fails when the result is not strictly positive.
pub fn calculate_trust_period(
    unbonding_period: Duration,
    fraction: &str,
) -> Result<Duration, SatelliteError> {
    let f: Fraction = fraction.parse()?;
    let nanos = unbonding_period
        .as_nanos()
        .checked_mul(f.numerator)
        .map(|v| v / f.denominator)
        .ok_or_else(|| SatelliteError::InvalidTrustPeriod("trust period overflow".into()))?;
    if nanos == 0 {
        return Err(SatelliteError::InvalidTrustPeriod(format!(
            "trusting period is not positive (unbonding {:?}, fraction {})",
            unbonding_period, fraction
        )));
    }
    let nanos = u64::try_from(nanos)
        .map_err(|_| SatelliteError::InvalidTrustPeriod("trust period overflow".into()))?;
    Ok(Duration::from_nanos(nanos))
}

/// Template the bootstrap light clients are built from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTemplate {
    pub max_clock_drift: Duration,
    pub trust_level: (u64, u64),
}

impl Default for ClientTemplate {
    fn default() -> Self {
        Self {
            max_clock_drift: Duration::from_secs(DEFAULT_MAX_CLOCK_DRIFT_SECS),
            trust_level: DEFAULT_TRUST_LEVEL,
        }
    }
}

/// Host-configured parameters of the lifecycle core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleParams {
    pub template_client: ClientTemplate,
    pub trusting_period_fraction: String,
    pub spawn_batch_limit: usize,
    pub removal_batch_limit: usize,
    pub provider_port_id: String,
    /// Number of provider validators in the active set; `0` = unbounded.
    pub max_provider_consensus_validators: usize,
}

impl Default for LifecycleParams {
    fn default() -> Self {
        Self {
            template_client: ClientTemplate::default(),
            trusting_period_fraction: DEFAULT_TRUSTING_PERIOD_FRACTION.to_string(),
            spawn_batch_limit: DEFAULT_BATCH_LIMIT,
            removal_batch_limit: DEFAULT_BATCH_LIMIT,
            provider_port_id: PROVIDER_PORT_ID.to_string(),
            max_provider_consensus_validators: 0,
        }
    }
}

impl LifecycleParams {
    pub fn validate(&self) -> Result<(), SatelliteError> {
        self.trusting_period_fraction
            .parse::<Fraction>()
            .map_err(|e| SatelliteError::Config(e.to_string()))?;
        if self.spawn_batch_limit == 0 || self.removal_batch_limit == 0 {
            return Err(SatelliteError::Config("batch limits must be positive".into()));
        }
        let (num, den) = self.template_client.trust_level;
        if den == 0 || num == 0 || num > den {
            return Err(SatelliteError::Config(format!(
                "trust level {num}/{den} must lie in (0, 1]"
            )));
        }
        if self.provider_port_id.is_empty() {
            return Err(SatelliteError::Config("provider port id is empty".into()));
        }
        Ok(())
    }
}
