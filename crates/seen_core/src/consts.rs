// crates/seen_core/src/consts.rs

pub const DEFAULT_NUM_ENTRIES: usize = 256;
pub const DEFAULT_NUM_HASHES: usize = 3;

/// Upper bounds checked at construction.
pub const MAX_NUM_HASHES: usize = 64;
pub const MAX_TOTAL_BITS: usize = 1 << 31;

pub const MAGIC_SNAP: &[u8; 4] = b"SEEN";
pub const VERSION: u16 = 1;

/// magic(4) + version(2) + rsv(2) + hasher(4) + k(4) + n(4) + bytes(4)
pub const HDR_SIZE: usize = 24;
pub const CRC_SIZE: usize = 4;

pub const HASHER_TAG_XXH3: u32 = u32::from_le_bytes(*b"XXH3");
pub const HASHER_TAG_BLAKE3: u32 = u32::from_le_bytes(*b"BLK3");

/// Operation selected per packet: exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Insert,
    Query,
}

const _: () = { assert!(HDR_SIZE == 4 + 2 + 2 + 4 + 4 + 4 + 4); };
