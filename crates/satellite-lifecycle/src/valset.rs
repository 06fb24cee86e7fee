//! Validator-set diffing and hashing.

use std::collections::{BTreeMap, BTreeSet};

use satellite_core::error::SatelliteError;
use satellite_core::types::{PublicKey, ValidatorAddress};
use satellite_core::validator::{ConsensusValidator, ValidatorUpdate};

/// Updates that turn `current` into `next`. Validators are matched by
/// provider address.
///
/// A validator missing from `next` is removed (its old key at power 0). One
/// whose key changed gets its old key removed and its new key added. One
/// whose power changed gets an update with the new power. Validators only in
/// `next` are added. With an empty `current` every entry is an add.
pub fn diff_validators(
    current: &[ConsensusValidator],
    next: &[ConsensusValidator],
) -> Vec<ValidatorUpdate> {
    let next_by_addr: BTreeMap<ValidatorAddress, &ConsensusValidator> =
        next.iter().map(|v| (v.provider_address, v)).collect();
    let current_addrs: BTreeSet<ValidatorAddress> =
        current.iter().map(|v| v.provider_address).collect();

    let mut updates = Vec::new();
    for old in current {
        match next_by_addr.get(&old.provider_address) {
            None => updates.push(ValidatorUpdate {
                public_key: old.public_key,
                power: 0,
            }),
            Some(new) if new.public_key != old.public_key => {
                updates.push(ValidatorUpdate {
                    public_key: old.public_key,
                    power: 0,
                });
                updates.push(ValidatorUpdate {
                    public_key: new.public_key,
                    power: new.power,
                });
            }
            Some(new) if new.power != old.power => updates.push(ValidatorUpdate {
                public_key: new.public_key,
                power: new.power,
            }),
            Some(_) => {}
        }
    }
    for new in next {
        if !current_addrs.contains(&new.provider_address) {
            updates.push(ValidatorUpdate {
                public_key: new.public_key,
                power: new.power,
            });
        }
    }
    updates
}

/// Hash of a validator set given as its update list.
///
/// Entries are ordered by power descending, then by consensus address, and
/// hashed as a BLAKE3 Merkle tree: leaf = H(0x00 ‖ bincode(key, power)),
/// node = H(0x01 ‖ left ‖ right), split at the largest power of two below
/// the length. The empty set hashes to H("").
pub fn validator_set_hash(set: &[ValidatorUpdate]) -> Result<[u8; 32], SatelliteError> {
    let mut seen = BTreeSet::new();
    let mut entries: Vec<(ValidatorAddress, &ValidatorUpdate)> = Vec::with_capacity(set.len());
    for update in set {
        if update.power == 0 {
            return Err(SatelliteError::InvalidGenesis(format!(
                "validator {} has zero power",
                update.public_key
            )));
        }
        if !seen.insert(update.public_key) {
            return Err(SatelliteError::InvalidGenesis(format!(
                "duplicate validator key {}",
                update.public_key
            )));
        }
        entries.push((update.public_key.address(), update));
    }
    entries.sort_by(|a, b| b.1.power.cmp(&a.1.power).then_with(|| a.0.cmp(&b.0)));

    let leaves = entries
        .iter()
        .map(|(_, u)| leaf_hash(&u.public_key, u.power))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merkle_root(&leaves))
}

fn leaf_hash(key: &PublicKey, power: u64) -> Result<[u8; 32], SatelliteError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[0x00]);
    hasher.update(&bincode::serialize(&(key, power))?);
    Ok(*hasher.finalize().as_bytes())
}

fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    match leaves.len() {
        0 => *blake3::hash(&[]).as_bytes(),
        1 => leaves[0],
        n => {
            let split = split_point(n);
            let left = merkle_root(&leaves[..split]);
            let right = merkle_root(&leaves[split..]);
            let mut hasher = blake3::Hasher::new();
            hasher.update(&[0x01]);
            hasher.update(&left);
            hasher.update(&right);
            *hasher.finalize().as_bytes()
        }
    }
}

/// Largest power of two strictly below `n` (n >= 2).
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}
