use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seen_core::FlowKey;

/// Deterministic pseudo-random flow keys for benchmarks.
pub fn random_keys(seed: u64, count: usize) -> Vec<FlowKey> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| FlowKey::new(rng.random(), rng.random())).collect()
}
