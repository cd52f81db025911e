//! Key id generation.

use crate::config::KeyPolicy;
use rand::Rng;

/// Source of candidate key ids.
///
/// Candidates need not be unique; the key store rejects collisions and asks
/// again.
pub trait KeyIdGenerator: Send + Sync {
    /// Returns a candidate id shaped by `policy`.
    fn next_id(&self, policy: &KeyPolicy) -> String;
}

/// Draws every character uniformly from the policy's alphabet using the
/// thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomKeyIds;

impl KeyIdGenerator for RandomKeyIds {
    fn next_id(&self, policy: &KeyPolicy) -> String {
        let charset = policy.alphabet.charset();
        let mut rng = rand::thread_rng();
        (0..policy.length)
            .map(|_| char::from(charset[rng.gen_range(0..charset.len())]))
            .collect()
    }
}
