//! Typed per-satellite records on top of the raw key-value capability.
//!
//! [`SatelliteRecords`] is implemented for every [`KvStore`], so the same
//! accessors work on the base store and on an isolated overlay.

use serde::de::DeserializeOwned;
use serde::Serialize;

use satellite_core::error::SatelliteError;
use satellite_core::genesis::SatelliteGenesis;
use satellite_core::params::{InitializationParameters, PowerShapingParameters, SatelliteMetadata};
use satellite_core::types::{PublicKey, SatelliteId, Timestamp, ValidatorAddress};
use satellite_core::validator::ConsensusValidator;
use satellite_store::keys::{self, satellite_key, validator_key};
use satellite_store::KvStore;

fn put<S, T>(store: &mut S, key: &[u8], value: &T) -> Result<(), SatelliteError>
where
    S: KvStore + ?Sized,
    T: Serialize,
{
    let bytes = bincode::serialize(value)?;
    store.set(key, &bytes)
}

fn fetch<S, T>(store: &S, key: &[u8]) -> Result<Option<T>, SatelliteError>
where
    S: KvStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get(key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn fetch_u64<S: KvStore + ?Sized>(store: &S, key: &[u8]) -> Result<Option<u64>, SatelliteError> {
    match store.get(key)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| SatelliteError::Serialization(format!("expected u64 under {key:?}")))?;
            Ok(Some(u64::from_be_bytes(arr)))
        }
        None => Ok(None),
    }
}

fn fetch_string<S: KvStore + ?Sized>(store: &S, key: &[u8]) -> Result<Option<String>, SatelliteError> {
    match store.get(key)? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| SatelliteError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Validator addresses stored under `prefix | id | addr`.
fn validator_members<S: KvStore + ?Sized>(
    store: &S,
    prefix: u8,
    id: &SatelliteId,
) -> Result<Vec<ValidatorAddress>, SatelliteError> {
    store
        .scan_prefix(&satellite_key(prefix, id))?
        .into_iter()
        .map(|(k, _)| keys::parse_validator_suffix(prefix, id, &k))
        .collect()
}

fn replace_members<S: KvStore + ?Sized>(
    store: &mut S,
    prefix: u8,
    id: &SatelliteId,
    members: &[ValidatorAddress],
) -> Result<(), SatelliteError> {
    store.delete_prefix(&satellite_key(prefix, id))?;
    for addr in members {
        store.set(&validator_key(prefix, id, addr), &[])?;
    }
    Ok(())
}

pub trait SatelliteRecords: KvStore {
    // ── Registration ─────────────────────────────────────────────────────────

    /// Hand out the next identifier. Identifiers are never reused.
    fn allocate_satellite_id(&mut self) -> Result<SatelliteId, SatelliteError> {
        let next = fetch_u64(self, &[keys::NEXT_ID])?.unwrap_or(0);
        self.set(&[keys::NEXT_ID], &(next + 1).to_be_bytes())?;
        Ok(SatelliteId(next.to_string()))
    }

    fn chain_id(&self, id: &SatelliteId) -> Result<String, SatelliteError> {
        fetch_string(self, &satellite_key(keys::CHAIN_ID, id))?
            .ok_or_else(|| SatelliteError::MissingChainId(id.to_string()))
    }

    fn set_chain_id(&mut self, id: &SatelliteId, chain_id: &str) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::CHAIN_ID, id), chain_id.as_bytes())
    }

    fn metadata(&self, id: &SatelliteId) -> Result<Option<SatelliteMetadata>, SatelliteError> {
        fetch(self, &satellite_key(keys::METADATA, id))
    }

    fn set_metadata(&mut self, id: &SatelliteId, metadata: &SatelliteMetadata) -> Result<(), SatelliteError> {
        put(self, &satellite_key(keys::METADATA, id), metadata)
    }

    // ── Parameters ───────────────────────────────────────────────────────────

    fn initialization_parameters(&self, id: &SatelliteId) -> Result<InitializationParameters, SatelliteError> {
        fetch(self, &satellite_key(keys::INIT_PARAMS, id))?
            .ok_or_else(|| SatelliteError::MissingInitializationParameters(id.to_string()))
    }

    fn set_initialization_parameters(
        &mut self,
        id: &SatelliteId,
        params: &InitializationParameters,
    ) -> Result<(), SatelliteError> {
        put(self, &satellite_key(keys::INIT_PARAMS, id), params)
    }

    fn power_shaping_parameters(&self, id: &SatelliteId) -> Result<PowerShapingParameters, SatelliteError> {
        fetch(self, &satellite_key(keys::POWER_SHAPING, id))?
            .ok_or_else(|| SatelliteError::MissingPowerShapingParameters(id.to_string()))
    }

    /// Store the parameters and replace the allowlist and denylist records
    /// with the lists they carry.
    fn set_power_shaping_parameters(
        &mut self,
        id: &SatelliteId,
        params: &PowerShapingParameters,
    ) -> Result<(), SatelliteError> {
        put(self, &satellite_key(keys::POWER_SHAPING, id), params)?;
        replace_members(self, keys::ALLOWLIST, id, &params.allowlist)?;
        replace_members(self, keys::DENYLIST, id, &params.denylist)
    }

    // ── Launch state ─────────────────────────────────────────────────────────

    fn client_id(&self, id: &SatelliteId) -> Result<Option<String>, SatelliteError> {
        fetch_string(self, &satellite_key(keys::CLIENT_ID, id))
    }

    fn set_client_id(&mut self, id: &SatelliteId, client_id: &str) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::CLIENT_ID, id), client_id.as_bytes())
    }

    fn delete_client_id(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::CLIENT_ID, id))
    }

    fn genesis(&self, id: &SatelliteId) -> Result<Option<SatelliteGenesis>, SatelliteError> {
        fetch(self, &satellite_key(keys::GENESIS, id))
    }

    fn set_genesis(&mut self, id: &SatelliteId, genesis: &SatelliteGenesis) -> Result<(), SatelliteError> {
        put(self, &satellite_key(keys::GENESIS, id), genesis)
    }

    fn delete_genesis(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::GENESIS, id))
    }

    fn equivocation_evidence_min_height(&self, id: &SatelliteId) -> Result<Option<u64>, SatelliteError> {
        fetch_u64(self, &satellite_key(keys::EVIDENCE_MIN_HEIGHT, id))
    }

    fn set_equivocation_evidence_min_height(&mut self, id: &SatelliteId, height: u64) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::EVIDENCE_MIN_HEIGHT, id), &height.to_be_bytes())
    }

    fn delete_equivocation_evidence_min_height(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::EVIDENCE_MIN_HEIGHT, id))
    }

    fn init_chain_height(&self, id: &SatelliteId) -> Result<Option<u64>, SatelliteError> {
        fetch_u64(self, &satellite_key(keys::INIT_CHAIN_HEIGHT, id))
    }

    fn set_init_chain_height(&mut self, id: &SatelliteId, height: u64) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::INIT_CHAIN_HEIGHT, id), &height.to_be_bytes())
    }

    fn delete_init_chain_height(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::INIT_CHAIN_HEIGHT, id))
    }

    // ── Removal ──────────────────────────────────────────────────────────────

    fn removal_time(&self, id: &SatelliteId) -> Result<Timestamp, SatelliteError> {
        match self.get(&satellite_key(keys::REMOVAL_TIME, id))? {
            Some(bytes) => keys::decode_time(&bytes),
            None => Err(SatelliteError::MissingRemovalTime(id.to_string())),
        }
    }

    fn set_removal_time(&mut self, id: &SatelliteId, at: Timestamp) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::REMOVAL_TIME, id), &keys::encode_time(at))
    }

    fn delete_removal_time(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::REMOVAL_TIME, id))
    }

    // ── Key assignment ───────────────────────────────────────────────────────

    fn consumer_key(
        &self,
        id: &SatelliteId,
        provider: &ValidatorAddress,
    ) -> Result<Option<PublicKey>, SatelliteError> {
        fetch(self, &validator_key(keys::CONSUMER_KEY, id, provider))
    }

    /// Provider validator a consumer address was assigned to, if any.
    fn consumer_key_owner(
        &self,
        id: &SatelliteId,
        consumer_addr: &ValidatorAddress,
    ) -> Result<Option<ValidatorAddress>, SatelliteError> {
        match self.get(&validator_key(keys::KEY_OWNER, id, consumer_addr))? {
            Some(bytes) => {
                let arr: [u8; 20] = bytes.as_slice().try_into().map_err(|_| {
                    SatelliteError::Serialization(format!("bad key owner record on satellite {id}"))
                })?;
                Ok(Some(ValidatorAddress(arr)))
            }
            None => Ok(None),
        }
    }

    /// Assign `key` as the key `provider` validates satellite `id` with.
    ///
    /// A consumer key belongs to at most one provider validator per chain.
    fn assign_consumer_key(
        &mut self,
        id: &SatelliteId,
        provider: &ValidatorAddress,
        key: &PublicKey,
    ) -> Result<(), SatelliteError> {
        let consumer_addr = key.address();
        if let Some(owner) = self.consumer_key_owner(id, &consumer_addr)? {
            if owner != *provider {
                return Err(SatelliteError::ConsumerKeyInUse {
                    id: id.to_string(),
                    owner: owner.to_string(),
                });
            }
            return Ok(());
        }
        if let Some(old) = self.consumer_key(id, provider)? {
            self.delete(&validator_key(keys::KEY_OWNER, id, &old.address()))?;
        }
        put(self, &validator_key(keys::CONSUMER_KEY, id, provider), key)?;
        self.set(&validator_key(keys::KEY_OWNER, id, &consumer_addr), provider.as_bytes())
    }

    fn key_assignments(&self, id: &SatelliteId) -> Result<Vec<(ValidatorAddress, PublicKey)>, SatelliteError> {
        let mut out = Vec::new();
        for (k, v) in self.scan_prefix(&satellite_key(keys::CONSUMER_KEY, id))? {
            let provider = keys::parse_validator_suffix(keys::CONSUMER_KEY, id, &k)?;
            let key: PublicKey = bincode::deserialize(&v)?;
            out.push((provider, key));
        }
        Ok(out)
    }

    /// Verify every forward assignment has the matching reverse record and
    /// vice versa. A mismatch is an invariant violation.
    fn check_key_assignments(&self, id: &SatelliteId) -> Result<(), SatelliteError> {
        let forward = self.key_assignments(id)?;
        for (provider, key) in &forward {
            match self.consumer_key_owner(id, &key.address())? {
                Some(owner) if owner == *provider => {}
                other => {
                    return Err(SatelliteError::InvariantViolation(format!(
                        "satellite {id}: consumer key of validator {provider} maps back to {other:?}"
                    )));
                }
            }
        }
        let reverse = self.scan_prefix(&satellite_key(keys::KEY_OWNER, id))?.len();
        if reverse != forward.len() {
            return Err(SatelliteError::InvariantViolation(format!(
                "satellite {id}: {} key assignments but {reverse} reverse records",
                forward.len()
            )));
        }
        Ok(())
    }

    /// Delete all key-assignment state of a chain. Fails without deleting
    /// anything if the state is inconsistent.
    fn delete_key_assignments(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.check_key_assignments(id)?;
        self.delete_prefix(&satellite_key(keys::CONSUMER_KEY, id))?;
        self.delete_prefix(&satellite_key(keys::KEY_OWNER, id))?;
        Ok(())
    }

    // ── Top-N ────────────────────────────────────────────────────────────────

    fn min_power_in_top_n(&self, id: &SatelliteId) -> Result<Option<u64>, SatelliteError> {
        fetch_u64(self, &satellite_key(keys::MIN_POWER_TOP_N, id))
    }

    fn set_min_power_in_top_n(&mut self, id: &SatelliteId, power: u64) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::MIN_POWER_TOP_N, id), &power.to_be_bytes())
    }

    fn delete_min_power_in_top_n(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::MIN_POWER_TOP_N, id))
    }

    // ── Channels ─────────────────────────────────────────────────────────────

    fn channel_id(&self, id: &SatelliteId) -> Result<Option<String>, SatelliteError> {
        fetch_string(self, &satellite_key(keys::ID_TO_CHANNEL, id))
    }

    fn satellite_by_channel(&self, channel_id: &str) -> Result<Option<SatelliteId>, SatelliteError> {
        Ok(fetch_string(self, &keys::channel_key(channel_id))?.map(SatelliteId))
    }

    fn set_channel(&mut self, id: &SatelliteId, channel_id: &str) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::ID_TO_CHANNEL, id), channel_id.as_bytes())?;
        self.set(&keys::channel_key(channel_id), id.as_bytes())
    }

    fn delete_channel(&mut self, id: &SatelliteId, channel_id: &str) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::ID_TO_CHANNEL, id))?;
        self.delete(&keys::channel_key(channel_id))
    }

    // ── Commission ───────────────────────────────────────────────────────────

    fn commission_rate(
        &self,
        id: &SatelliteId,
        provider: &ValidatorAddress,
    ) -> Result<Option<String>, SatelliteError> {
        fetch_string(self, &validator_key(keys::COMMISSION_RATE, id, provider))
    }

    fn set_commission_rate(
        &mut self,
        id: &SatelliteId,
        provider: &ValidatorAddress,
        rate: &str,
    ) -> Result<(), SatelliteError> {
        self.set(&validator_key(keys::COMMISSION_RATE, id, provider), rate.as_bytes())
    }

    fn commission_rate_validators(&self, id: &SatelliteId) -> Result<Vec<ValidatorAddress>, SatelliteError> {
        validator_members(self, keys::COMMISSION_RATE, id)
    }

    fn delete_commission_rate(&mut self, id: &SatelliteId, provider: &ValidatorAddress) -> Result<(), SatelliteError> {
        self.delete(&validator_key(keys::COMMISSION_RATE, id, provider))
    }

    // ── Allowlist / denylist ─────────────────────────────────────────────────

    fn allowlist(&self, id: &SatelliteId) -> Result<Vec<ValidatorAddress>, SatelliteError> {
        validator_members(self, keys::ALLOWLIST, id)
    }

    fn denylist(&self, id: &SatelliteId) -> Result<Vec<ValidatorAddress>, SatelliteError> {
        validator_members(self, keys::DENYLIST, id)
    }

    /// An empty allowlist allows everyone.
    fn is_allowlisted(&self, id: &SatelliteId, provider: &ValidatorAddress) -> Result<bool, SatelliteError> {
        if self.scan_prefix(&satellite_key(keys::ALLOWLIST, id))?.is_empty() {
            return Ok(true);
        }
        self.has(&validator_key(keys::ALLOWLIST, id, provider))
    }

    fn is_denylisted(&self, id: &SatelliteId, provider: &ValidatorAddress) -> Result<bool, SatelliteError> {
        self.has(&validator_key(keys::DENYLIST, id, provider))
    }

    fn delete_allowlist(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete_prefix(&satellite_key(keys::ALLOWLIST, id)).map(|_| ())
    }

    fn delete_denylist(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete_prefix(&satellite_key(keys::DENYLIST, id)).map(|_| ())
    }

    // ── Opt-in ───────────────────────────────────────────────────────────────

    fn set_opted_in(&mut self, id: &SatelliteId, provider: &ValidatorAddress) -> Result<(), SatelliteError> {
        self.set(&validator_key(keys::OPTED_IN, id, provider), &[])
    }

    fn delete_opted_in(&mut self, id: &SatelliteId, provider: &ValidatorAddress) -> Result<(), SatelliteError> {
        self.delete(&validator_key(keys::OPTED_IN, id, provider))
    }

    fn is_opted_in(&self, id: &SatelliteId, provider: &ValidatorAddress) -> Result<bool, SatelliteError> {
        self.has(&validator_key(keys::OPTED_IN, id, provider))
    }

    fn opted_in(&self, id: &SatelliteId) -> Result<Vec<ValidatorAddress>, SatelliteError> {
        validator_members(self, keys::OPTED_IN, id)
    }

    fn delete_all_opted_in(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete_prefix(&satellite_key(keys::OPTED_IN, id)).map(|_| ())
    }

    // ── Satellite validator set ──────────────────────────────────────────────

    fn validator_set(&self, id: &SatelliteId) -> Result<Vec<ConsensusValidator>, SatelliteError> {
        self.scan_prefix(&satellite_key(keys::VALIDATOR_SET, id))?
            .into_iter()
            .map(|(_, v)| bincode::deserialize(&v).map_err(SatelliteError::from))
            .collect()
    }

    fn set_validator_set(&mut self, id: &SatelliteId, validators: &[ConsensusValidator]) -> Result<(), SatelliteError> {
        self.delete_validator_set(id)?;
        for v in validators {
            put(self, &validator_key(keys::VALIDATOR_SET, id, &v.provider_address), v)?;
        }
        Ok(())
    }

    fn delete_validator_set(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete_prefix(&satellite_key(keys::VALIDATOR_SET, id)).map(|_| ())
    }

    // ── Rewards / relay bookkeeping ──────────────────────────────────────────

    fn rewards_allocation(&self, id: &SatelliteId) -> Result<Option<Vec<u8>>, SatelliteError> {
        self.get(&satellite_key(keys::REWARDS, id))
    }

    fn set_rewards_allocation(&mut self, id: &SatelliteId, allocation: &[u8]) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::REWARDS, id), allocation)
    }

    fn delete_rewards_allocation(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::REWARDS, id))
    }

    fn slash_acks(&self, id: &SatelliteId) -> Result<Vec<String>, SatelliteError> {
        Ok(fetch(self, &satellite_key(keys::SLASH_ACKS, id))?.unwrap_or_default())
    }

    fn append_slash_ack(&mut self, id: &SatelliteId, ack: &str) -> Result<(), SatelliteError> {
        let mut acks = self.slash_acks(id)?;
        acks.push(ack.to_string());
        put(self, &satellite_key(keys::SLASH_ACKS, id), &acks)
    }

    fn delete_slash_acks(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::SLASH_ACKS, id))
    }

    fn pending_packets(&self, id: &SatelliteId) -> Result<Option<Vec<u8>>, SatelliteError> {
        self.get(&satellite_key(keys::PENDING_PACKETS, id))
    }

    fn set_pending_packets(&mut self, id: &SatelliteId, packets: &[u8]) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::PENDING_PACKETS, id), packets)
    }

    fn delete_pending_packets(&mut self, id: &SatelliteId) -> Result<(), SatelliteError> {
        self.delete(&satellite_key(keys::PENDING_PACKETS, id))
    }
}

impl<S: KvStore + ?Sized> SatelliteRecords for S {}
