//! Key hashing for bit pages.
//!
//! Each key is hashed twice and the two values are combined with double
//! hashing: `position_i = (h1 + i * h2) mod num_bits`. This is as good as
//! k independent hash functions for bloom filters and much cheaper.

use std::hash::Hasher;

const SEED_1: u64 = 0xbc9f_1d34;
const SEED_2: u64 = 0xd0e8_9c7b;

/// A pair of independent 64-bit hashes of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHash {
    h1: u64,
    h2: u64,
}

impl KeyHash {
    /// Hashes `key`.
    pub fn new(key: &[u8]) -> Self {
        Self { h1: hash_with_seed(key, SEED_1), h2: hash_with_seed(key, SEED_2) }
    }

    /// Iterates the `num_hashes` bit positions of this key in a page of `num_bits` bits.
    pub fn positions(self, num_hashes: u32, num_bits: u64) -> impl Iterator<Item = u64> {
        debug_assert!(num_bits > 0);
        (0..num_hashes as u64)
            .map(move |i| self.h1.wrapping_add(i.wrapping_mul(self.h2)) % num_bits)
    }
}

fn hash_with_seed(key: &[u8], seed: u64) -> u64 {
    let mut hasher = FnvHasher::new_with_seed(seed);
    hasher.write(key);
    fmix64(hasher.finish())
}

/// Final avalanche step from MurmurHash3. Plain FNV-1a leaves the high bits
/// of short keys poorly mixed, and both seeds would otherwise correlate.
fn fmix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

/// FNV-1a hasher with a seeded offset basis.
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new_with_seed(seed: u64) -> Self {
        Self { state: Self::FNV_OFFSET_BASIS ^ seed }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}
