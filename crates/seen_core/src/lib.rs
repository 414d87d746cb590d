//! Multi-hash bloom filter for classifying packets as "possibly seen" vs
//! "definitely new" without per-flow state.
pub mod consts;
pub mod errors;
pub mod utils;
pub mod hash;
pub mod key;
pub mod bits;
pub mod config;
pub mod filter;
pub mod shared;
pub mod snapshot;

pub use bits::BitArray;
pub use config::FilterConfig;
pub use consts::FilterMode;
pub use errors::{Result, SeenError};
pub use filter::{classify, MultiHashBloomFilter, Outcome};
pub use hash::{Blake3Hasher, FlowHasher, Xxh3Hasher};
pub use key::{Classification, FlowKey, Packet};
pub use shared::SharedFilter;
