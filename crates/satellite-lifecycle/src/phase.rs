use satellite_core::error::SatelliteError;
use satellite_core::types::{Phase, SatelliteId};
use satellite_store::keys::{self, satellite_key};
use satellite_store::KvStore;

/// Current phase of every satellite, keyed by id.
pub trait PhaseRegistry: KvStore {
    /// Phase of `id`; an id that was never registered is `Unspecified`.
    fn phase(&self, id: &SatelliteId) -> Result<Phase, SatelliteError> {
        match self.get(&satellite_key(keys::PHASE, id))? {
            None => Ok(Phase::Unspecified),
            Some(bytes) => match bytes.as_slice() {
                [b] => Phase::from_u8(*b).ok_or_else(|| {
                    SatelliteError::Serialization(format!("unknown phase byte {b} for satellite {id}"))
                }),
                _ => Err(SatelliteError::Serialization(format!(
                    "phase record of satellite {id} is {} bytes",
                    bytes.len()
                ))),
            },
        }
    }

    /// Overwrite the phase unconditionally. Callers check the transition
    /// with [`ensure_transition`] first.
    fn set_phase(&mut self, id: &SatelliteId, phase: Phase) -> Result<(), SatelliteError> {
        self.set(&satellite_key(keys::PHASE, id), &[phase.as_u8()])
    }

    /// Ids of every satellite currently in `phase`, in key order.
    fn satellites_in_phase(&self, phase: Phase) -> Result<Vec<SatelliteId>, SatelliteError> {
        let mut out = Vec::new();
        for (k, v) in self.scan_prefix(&[keys::PHASE])? {
            if v.as_slice() == [phase.as_u8()] {
                out.push(keys::parse_satellite_key(keys::PHASE, &k)?);
            }
        }
        Ok(out)
    }
}

impl<S: KvStore + ?Sized> PhaseRegistry for S {}

/// Reject a move from `current` to `next` that the transition table does
/// not allow, naming the phases `next` may be entered from.
pub fn ensure_transition(id: &SatelliteId, current: Phase, next: Phase) -> Result<(), SatelliteError> {
    if current.can_transition_to(next) {
        return Ok(());
    }
    let sources = Phase::sources_of(next);
    if sources.is_empty() {
        return Err(SatelliteError::InvalidTransition {
            id: id.to_string(),
            from: current,
            to: next,
        });
    }
    Err(SatelliteError::invalid_phase(id, current, &sources))
}
