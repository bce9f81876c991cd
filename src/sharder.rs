//! Deterministic bucketing of entities for percentage rollouts.
//!
//! The bucket of an entity must be the same in every process and every SDK, so the hash is fixed
//! and versioned by [`ROLLOUT_HASH_VERSION`]:
//!
//! ```text
//! bucket = u32_be(md5("{entity_id}:{targetable_id}")[0..4]) % 100
//! ```
//!
//! An entity is admitted by a rollout of `p` percent iff `bucket < p`.

/// Version of the rollout hash. Changing the bucketing function must bump this value.
pub const ROLLOUT_HASH_VERSION: u32 = 1;

const TOTAL_BUCKETS: u32 = 100;

/// Assigns entities to rollout buckets.
pub trait Sharder {
    /// Return a bucket in `[0, 100)` for the given entity and feature/property id.
    fn get_bucket(&self, entity_id: &str, targetable_id: &str) -> u32;

    /// Return `true` if the entity falls within `percentage` of the rollout.
    fn is_in_rollout(&self, entity_id: &str, targetable_id: &str, percentage: u32) -> bool {
        percentage >= TOTAL_BUCKETS || self.get_bucket(entity_id, targetable_id) < percentage
    }
}

/// The default (and only) sharder.
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_bucket(&self, entity_id: &str, targetable_id: &str) -> u32 {
        let hash = md5::compute(format!("{entity_id}:{targetable_id}"));
        let value = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
        value % TOTAL_BUCKETS
    }
}
