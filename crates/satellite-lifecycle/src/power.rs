//! Power shaping: who validates a satellite and with how much power.

use std::collections::BTreeSet;

use satellite_core::error::SatelliteError;
use satellite_core::params::PowerShapingParameters;
use satellite_core::types::{Power, SatelliteId, ValidatorAddress};
use satellite_core::validator::{ConsensusValidator, ProviderValidator};
use satellite_store::KvStore;
use tracing::{debug, info};

use crate::records::SatelliteRecords;

/// Smallest power `p` such that the active validators with power `>= p`
/// together hold at least `top_n` percent of the total active power.
pub fn compute_min_power_in_top_n(active: &[ProviderValidator], top_n: u32) -> Result<Power, SatelliteError> {
    if top_n == 0 || top_n > 100 {
        return Err(SatelliteError::InvalidPowerShaping(format!(
            "top_n must be in 1..=100, got {top_n}"
        )));
    }
    let mut powers: Vec<u128> = active.iter().map(|v| u128::from(v.power)).collect();
    let total: u128 = powers.iter().sum();
    if total == 0 {
        return Err(SatelliteError::NoValidators(
            "active validator set has no power".into(),
        ));
    }
    powers.sort_unstable_by(|a, b| b.cmp(a));

    let target = u128::from(top_n) * total;
    let mut sum = 0u128;
    for p in powers {
        sum += p;
        if sum * 100 >= target {
            return Ok(p as Power);
        }
    }
    Err(SatelliteError::InvariantViolation(
        "top-N threshold not reached by the whole active set".into(),
    ))
}

/// Opt in every active validator at or above `min_power`, skipping
/// denylisted ones, and record the threshold.
pub fn opt_in_top_n<S: KvStore + ?Sized>(
    store: &mut S,
    id: &SatelliteId,
    active: &[ProviderValidator],
    min_power: Power,
) -> Result<usize, SatelliteError> {
    let mut count = 0;
    for v in active.iter().filter(|v| v.power >= min_power) {
        if store.is_denylisted(id, &v.address)? {
            continue;
        }
        store.set_opted_in(id, &v.address)?;
        count += 1;
    }
    store.set_min_power_in_top_n(id, min_power)?;
    info!(satellite_id = %id, min_power, opted_in = count, "top-N validators opted in");
    Ok(count)
}

/// Whether `v` may validate satellite `id` under `params`.
fn can_validate<S: KvStore + ?Sized>(
    store: &S,
    id: &SatelliteId,
    v: &ProviderValidator,
    params: &PowerShapingParameters,
    min_power: Option<Power>,
) -> Result<bool, SatelliteError> {
    let in_top_n = params.top_n > 0 && min_power.is_some_and(|m| v.power >= m);
    if !(store.is_opted_in(id, &v.address)? || in_top_n) {
        return Ok(false);
    }
    if !store.is_allowlisted(id, &v.address)? || store.is_denylisted(id, &v.address)? {
        return Ok(false);
    }
    Ok(v.tokens >= params.min_stake)
}

/// Build the satellite's validator set from the bonded provider validators.
///
/// Unless `allow_inactive_vals` is set, only bonded validators that are also
/// in `active` (the provider's active set) are eligible. The result has the
/// set cap and the power cap applied and is ordered by power descending,
/// then provider address.
pub fn compute_next_validators<S: KvStore + ?Sized>(
    store: &S,
    id: &SatelliteId,
    bonded: &[ProviderValidator],
    active: &[ProviderValidator],
    params: &PowerShapingParameters,
) -> Result<Vec<ConsensusValidator>, SatelliteError> {
    let active: BTreeSet<ValidatorAddress> = active.iter().map(|v| v.address).collect();
    let eligible = bonded
        .iter()
        .filter(|v| params.allow_inactive_vals || active.contains(&v.address));

    let min_power = store.min_power_in_top_n(id)?;
    let mut next = Vec::new();
    for v in eligible {
        if v.power == 0 || !can_validate(store, id, v, params, min_power)? {
            continue;
        }
        let public_key = store.consumer_key(id, &v.address)?.unwrap_or(v.consensus_key);
        next.push(ConsensusValidator {
            provider_address: v.address,
            power: v.power,
            public_key,
        });
    }
    debug!(satellite_id = %id, eligible = next.len(), "computed next validator set");

    let next = cap_validator_set(next, params.validator_set_cap);
    Ok(cap_validators_power(next, params.validators_power_cap))
}

fn sort_by_power(validators: &mut [ConsensusValidator]) {
    validators.sort_by(|a, b| {
        b.power
            .cmp(&a.power)
            .then_with(|| a.provider_address.cmp(&b.provider_address))
    });
}

/// Keep the `cap` most powerful validators. `0` means no cap.
pub fn cap_validator_set(mut validators: Vec<ConsensusValidator>, cap: u32) -> Vec<ConsensusValidator> {
    sort_by_power(&mut validators);
    if cap > 0 {
        validators.truncate(cap as usize);
    }
    validators
}

/// Limit every validator to `cap_pct` percent of the total power.
///
/// Power taken from capped validators is handed to the uncapped ones in
/// proportion to their power, repeating until nobody exceeds the cap. When
/// the cap cannot be met (too few validators) everyone gets the cap.
/// `0` or `100` leaves the set unchanged.
pub fn cap_validators_power(mut validators: Vec<ConsensusValidator>, cap_pct: u32) -> Vec<ConsensusValidator> {
    sort_by_power(&mut validators);
    if cap_pct == 0 || cap_pct >= 100 || validators.is_empty() {
        return validators;
    }

    let total: u128 = validators.iter().map(|v| u128::from(v.power)).sum();
    let max = (total * u128::from(cap_pct) / 100).max(1);
    if validators.len() as u128 * max <= total {
        for v in &mut validators {
            v.power = max as Power;
        }
        return validators;
    }

    let mut powers: Vec<u128> = validators.iter().map(|v| u128::from(v.power)).collect();
    let mut capped = vec![false; powers.len()];
    loop {
        let mut excess = 0u128;
        for (p, c) in powers.iter_mut().zip(capped.iter_mut()) {
            if !*c && *p > max {
                excess += *p - max;
                *p = max;
                *c = true;
            }
        }
        if excess == 0 {
            break;
        }
        let uncapped: Vec<usize> = (0..powers.len()).filter(|&i| !capped[i]).collect();
        let uncapped_total: u128 = uncapped.iter().map(|&i| powers[i]).sum();
        if uncapped_total == 0 {
            break;
        }
        let mut handed = 0u128;
        let shares: Vec<u128> = uncapped
            .iter()
            .map(|&i| excess * powers[i] / uncapped_total)
            .collect();
        for (&i, share) in uncapped.iter().zip(shares) {
            powers[i] += share;
            handed += share;
        }
        for &i in uncapped.iter().cycle().take((excess - handed) as usize) {
            powers[i] += 1;
        }
    }

    for (v, p) in validators.iter_mut().zip(powers) {
        v.power = p as Power;
    }
    sort_by_power(&mut validators);
    validators
}

#[cfg(test)]
mod tests {
    use super::*;
    use satellite_core::types::PublicKey;
    use satellite_store::MemStore;

    fn pv(b: u8, power: u64, tokens: u64) -> ProviderValidator {
        ProviderValidator {
            address: ValidatorAddress([b; 20]),
            consensus_key: PublicKey([b; 32]),
            power,
            tokens,
        }
    }

    fn cv(b: u8, power: u64) -> ConsensusValidator {
        ConsensusValidator {
            provider_address: ValidatorAddress([b; 20]),
            power,
            public_key: PublicKey([b; 32]),
        }
    }

    fn powers(vals: &[ConsensusValidator]) -> Vec<u64> {
        vals.iter().map(|v| v.power).collect()
    }

    #[test]
    fn min_power_covers_top_n_with_ties() {
        let active = vec![pv(1, 40, 0), pv(2, 30, 0), pv(3, 20, 0), pv(4, 10, 0)];
        assert_eq!(compute_min_power_in_top_n(&active, 50).unwrap(), 30);
        assert_eq!(compute_min_power_in_top_n(&active, 70).unwrap(), 30);
        assert_eq!(compute_min_power_in_top_n(&active, 71).unwrap(), 20);
        assert_eq!(compute_min_power_in_top_n(&active, 100).unwrap(), 10);
    }

    #[test]
    fn min_power_rejects_bad_input() {
        assert!(compute_min_power_in_top_n(&[pv(1, 10, 0)], 0).is_err());
        assert!(compute_min_power_in_top_n(&[pv(1, 10, 0)], 101).is_err());
        assert!(matches!(
            compute_min_power_in_top_n(&[], 50),
            Err(SatelliteError::NoValidators(_))
        ));
    }

    #[test]
    fn power_cap_redistributes_excess() {
        let capped = cap_validators_power(vec![cv(1, 100), cv(2, 10), cv(3, 10)], 50);
        assert_eq!(powers(&capped), vec![60, 30, 30]);
    }

    #[test]
    fn infeasible_power_cap_flattens() {
        let capped = cap_validators_power(vec![cv(1, 100), cv(2, 10)], 40);
        assert_eq!(powers(&capped), vec![44, 44]);
    }

    #[test]
    fn power_cap_never_exceeded() {
        let vals: Vec<_> = (1..=12u8).map(|b| cv(b, u64::from(b) * u64::from(b) * 7)).collect();
        let total: u64 = vals.iter().map(|v| v.power).sum();
        let capped = cap_validators_power(vals, 15);
        let max = total * 15 / 100;
        assert!(capped.iter().all(|v| v.power <= max), "{:?}", powers(&capped));
        assert_eq!(capped.iter().map(|v| v.power).sum::<u64>(), total);
    }

    #[test]
    fn set_cap_keeps_strongest() {
        let capped = cap_validator_set(vec![cv(1, 5), cv(2, 50), cv(3, 20)], 2);
        assert_eq!(powers(&capped), vec![50, 20]);
    }

    #[test]
    fn next_validators_apply_filters_and_assigned_keys() {
        let mut s = MemStore::new();
        let id = SatelliteId::from("0");
        let params = PowerShapingParameters {
            denylist: vec![ValidatorAddress([3; 20])],
            min_stake: 100,
            ..Default::default()
        };
        s.set_power_shaping_parameters(&id, &params).unwrap();
        for b in 1..=4 {
            s.set_opted_in(&id, &ValidatorAddress([b; 20])).unwrap();
        }
        s.assign_consumer_key(&id, &ValidatorAddress([1; 20]), &PublicKey([0xaa; 32]))
            .unwrap();

        // 3 is denylisted, 4 is below min stake, 5 never opted in.
        let bonded = vec![pv(1, 10, 500), pv(2, 20, 400), pv(3, 30, 300), pv(4, 40, 50), pv(5, 50, 600)];
        let next = compute_next_validators(&s, &id, &bonded, &bonded, &params).unwrap();
        assert_eq!(powers(&next), vec![20, 10]);
        assert_eq!(next[1].public_key, PublicKey([0xaa; 32]));
        assert_eq!(next[0].public_key, PublicKey([2; 32]));
    }

    #[test]
    fn inactive_validators_excluded_unless_allowed() {
        let mut s = MemStore::new();
        let id = SatelliteId::from("0");
        let mut params = PowerShapingParameters::default();
        s.set_power_shaping_parameters(&id, &params).unwrap();
        s.set_opted_in(&id, &ValidatorAddress([1; 20])).unwrap();
        s.set_opted_in(&id, &ValidatorAddress([2; 20])).unwrap();
        let bonded = vec![pv(1, 10, 1_000), pv(2, 5, 10)];
        let active = vec![pv(1, 10, 1_000)];

        let next = compute_next_validators(&s, &id, &bonded, &active, &params).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].provider_address, ValidatorAddress([1; 20]));
        params.allow_inactive_vals = true;
        assert_eq!(compute_next_validators(&s, &id, &bonded, &active, &params).unwrap().len(), 2);
    }

    #[test]
    fn top_n_opt_in_skips_denylisted() {
        let mut s = MemStore::new();
        let id = SatelliteId::from("0");
        let params = PowerShapingParameters {
            top_n: 50,
            denylist: vec![ValidatorAddress([1; 20])],
            ..Default::default()
        };
        s.set_power_shaping_parameters(&id, &params).unwrap();
        let active = vec![pv(1, 40, 0), pv(2, 30, 0), pv(3, 20, 0)];
        let min = compute_min_power_in_top_n(&active, params.top_n).unwrap();
        assert_eq!(opt_in_top_n(&mut s, &id, &active, min).unwrap(), 1);
        assert!(s.is_opted_in(&id, &ValidatorAddress([2; 20])).unwrap());
        assert!(!s.is_opted_in(&id, &ValidatorAddress([1; 20])).unwrap());
        assert_eq!(s.min_power_in_top_n(&id).unwrap(), Some(min));
    }
}
