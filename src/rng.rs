//! Reproducible random number substreams.
//!
//! Every simulation owns an independently seeded generator derived from the
//! run seed and the simulation index. Substreams are counter-based: seed
//! derivation is a pure function of `(seed, index)`, so results are identical
//! regardless of worker-pool size or scheduling order. A shared mutable
//! generator would tie the draw sequence to execution order and break
//! parallel determinism.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Derive a well-distributed substream seed from a run seed and a counter.
///
/// Uses a splitmix64-style finalizer so that consecutive indices map to
/// decorrelated seeds.
pub fn substream_seed(seed: u64, index: u64) -> u64 {
    let mut z = seed ^ index.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Create the generator for one substream.
pub fn substream(seed: u64, index: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(substream_seed(seed, index))
}
