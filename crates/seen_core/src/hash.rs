//! Hash collaborators. The filter treats these as black-box uniform digests
//! over the two key fields; `identity` selects an independent member of the
//! family, one per bit array.
use crate::consts::{HASHER_TAG_BLAKE3, HASHER_TAG_XXH3};
use crate::utils::field_bytes;

pub trait FlowHasher {
    /// Stable 4-byte tag written into snapshots.
    const TAG: u32;

    fn hash(&self, field_a: u64, field_b: u64, identity: u32) -> u64;
}

/// XXH3-64 seeded with the array identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xxh3Hasher;

impl FlowHasher for Xxh3Hasher {
    const TAG: u32 = HASHER_TAG_XXH3;

    #[inline]
    fn hash(&self, field_a: u64, field_b: u64, identity: u32) -> u64 {
        xxhash_rust::xxh3::xxh3_64_with_seed(&field_bytes(field_a, field_b), identity as u64)
    }
}

/// BLAKE3 over `a || b || identity`, first 8 digest bytes. Slower, but
/// independent of the xxh3 family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blake3Hasher;

impl FlowHasher for Blake3Hasher {
    const TAG: u32 = HASHER_TAG_BLAKE3;

    fn hash(&self, field_a: u64, field_b: u64, identity: u32) -> u64 {
        let mut h = blake3::Hasher::new();
        h.update(&field_bytes(field_a, field_b));
        h.update(&identity.to_le_bytes());
        let dig = h.finalize();
        let mut first = [0u8; 8];
        first.copy_from_slice(&dig.as_bytes()[..8]);
        u64::from_le_bytes(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let h = Xxh3Hasher;
        assert_eq!(h.hash(80, 8080, 0), h.hash(80, 8080, 0));
        let b = Blake3Hasher;
        assert_eq!(b.hash(80, 8080, 2), b.hash(80, 8080, 2));
    }

    #[test]
    fn identity_changes_digest() {
        assert_ne!(Xxh3Hasher.hash(80, 8080, 0), Xxh3Hasher.hash(80, 8080, 1));
        assert_ne!(Blake3Hasher.hash(80, 8080, 0), Blake3Hasher.hash(80, 8080, 1));
    }

    #[test]
    fn field_order_matters() {
        assert_ne!(Xxh3Hasher.hash(80, 8080, 0), Xxh3Hasher.hash(8080, 80, 0));
    }

    #[test]
    fn tags_are_distinct() {
        assert_ne!(Xxh3Hasher::TAG, Blake3Hasher::TAG);
    }
}
