//! Deterministic time and randomness.
//!
//! Workflow time advances only when the decider applies an epoch's
//! `DecisionTaskStarted` timestamp, so every replay observes the same
//! readings. Randomness is derived from the run id plus a replay-stable
//! counter, so `random_uuid` and `new_random` return identical values on
//! every replay of the same run.

use crate::error::ReplayError;
use chrono::{DateTime, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use uuid::Uuid;

/// The engine's view of "now".
#[derive(Clone, Debug)]
pub(crate) struct ClockContext {
    replay_current_time_millis: Option<i64>,
    replaying: bool,
}

impl ClockContext {
    pub fn new() -> Self {
        Self {
            replay_current_time_millis: None,
            replaying: true,
        }
    }

    /// Advance to an epoch's timestamp. Time is monotone non-decreasing; a
    /// regression means the history is inconsistent with what this engine
    /// already applied.
    pub fn set_time(&mut self, observed_millis: i64) -> Result<(), ReplayError> {
        if let Some(current) = self.replay_current_time_millis {
            if observed_millis < current {
                return Err(ReplayError::TimeWentBackward {
                    current_millis: current,
                    observed_millis,
                });
            }
        }
        self.replay_current_time_millis = Some(observed_millis);
        Ok(())
    }

    pub fn current_time_millis(&self) -> i64 {
        self.replay_current_time_millis.unwrap_or(-1)
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.current_time_millis())
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }
}

/// Deterministic UUID/random source scoped to one run.
#[derive(Clone, Debug)]
pub(crate) struct DeterministicIds {
    namespace: Uuid,
}

impl DeterministicIds {
    /// Namespace from the run id. Run ids are UUIDs in practice; anything
    /// else is hashed into one so the derivation stays total.
    pub fn new(run_id: &str) -> Self {
        let namespace = Uuid::parse_str(run_id)
            .unwrap_or_else(|_| Uuid::new_v3(&Uuid::NAMESPACE_OID, run_id.as_bytes()));
        Self { namespace }
    }

    /// The nth deterministic UUID of this run.
    pub fn uuid_for(&self, counter: i64) -> Uuid {
        Uuid::new_v3(&self.namespace, counter.to_string().as_bytes())
    }

    /// Seed a generator from the first eight bytes of a deterministic UUID.
    pub fn rng_for(&self, counter: i64) -> StdRng {
        let uuid = self.uuid_for(counter);
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&uuid.as_bytes()[..8]);
        StdRng::seed_from_u64(u64::from_be_bytes(seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn time_is_monotone_non_decreasing() {
        let mut clock = ClockContext::new();
        assert_eq!(clock.current_time_millis(), -1);

        clock.set_time(1_000).unwrap();
        clock.set_time(1_000).unwrap();
        clock.set_time(2_500).unwrap();
        assert_eq!(clock.current_time_millis(), 2_500);

        let err = clock.set_time(2_000).unwrap_err();
        assert_eq!(
            err,
            ReplayError::TimeWentBackward {
                current_millis: 2_500,
                observed_millis: 2_000,
            }
        );
    }

    #[test]
    fn uuids_are_stable_per_run_and_counter() {
        let run_id = "0c7c8a73-9a6f-4c3d-8d2f-4b2a8c9f1e11";
        let a = DeterministicIds::new(run_id);
        let b = DeterministicIds::new(run_id);

        assert_eq!(a.uuid_for(0), b.uuid_for(0));
        assert_eq!(a.uuid_for(7), b.uuid_for(7));
        assert_ne!(a.uuid_for(0), a.uuid_for(1));

        let other = DeterministicIds::new("c2c6c4ee-14b8-4c9c-a0b6-1c3d0a9d2f55");
        assert_ne!(a.uuid_for(0), other.uuid_for(0));
    }

    #[test]
    fn rng_streams_replay_identically() {
        let ids = DeterministicIds::new("0c7c8a73-9a6f-4c3d-8d2f-4b2a8c9f1e11");
        let mut first = ids.rng_for(3);
        let mut second = ids.rng_for(3);

        let a: [u64; 4] = std::array::from_fn(|_| first.random());
        let b: [u64; 4] = std::array::from_fn(|_| second.random());
        assert_eq!(a, b);
    }

    #[test]
    fn non_uuid_run_ids_still_derive_a_namespace() {
        let ids = DeterministicIds::new("not-a-uuid");
        assert_eq!(ids.uuid_for(0), DeterministicIds::new("not-a-uuid").uuid_for(0));
    }
}
