//! K independent bit arrays of N bits, one hash identity per array.
//!
//! A key is a member iff its bit is set in every array. Bits only go from
//! false to true; `reset` is the one way back.
use crate::bits::BitArray;
use crate::config::FilterConfig;
use crate::consts::FilterMode;
use crate::errors::{Result, SeenError};
use crate::hash::{FlowHasher, Xxh3Hasher};
use crate::key::{Classification, FlowKey, Packet};

/// What a single `apply` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Queried { member: bool },
}

#[derive(Clone, Debug)]
pub struct MultiHashBloomFilter<H = Xxh3Hasher> {
    config: FilterConfig,
    arrays: Vec<BitArray>,
    hasher: H,
}

impl MultiHashBloomFilter<Xxh3Hasher> {
    pub fn new(config: FilterConfig) -> Result<Self> {
        Self::with_hasher(config, Xxh3Hasher)
    }
}

impl<H: FlowHasher> MultiHashBloomFilter<H> {
    pub fn with_hasher(config: FilterConfig, hasher: H) -> Result<Self> {
        config.validate()?;
        let arrays = (0..config.num_hashes).map(|_| BitArray::new(config.num_entries)).collect();
        tracing::debug!(n = config.num_entries, k = config.num_hashes, "filter created");
        Ok(Self { config, arrays, hasher })
    }

    /// Used by snapshot loading; arrays must already match `config`.
    pub(crate) fn from_parts(config: FilterConfig, arrays: Vec<BitArray>, hasher: H) -> Self {
        debug_assert_eq!(arrays.len(), config.num_hashes);
        Self { config, arrays, hasher }
    }

    pub fn config(&self) -> &FilterConfig { &self.config }
    pub fn num_entries(&self) -> usize { self.config.num_entries }
    pub fn num_hashes(&self) -> usize { self.config.num_hashes }
    pub fn arrays(&self) -> &[BitArray] { &self.arrays }
    pub fn hasher(&self) -> &H { &self.hasher }

    #[inline]
    fn index_for(&self, key: &FlowKey, identity: usize) -> usize {
        let (a, b) = key.fields();
        let n = self.config.num_entries as u64;
        (self.hasher.hash(a, b, identity as u32) % n) as usize
    }

    /// One index per array: `hash(sport, dport, i) mod N` for i in 0..K.
    pub fn compute_indices(&self, key: &FlowKey) -> Vec<usize> {
        (0..self.config.num_hashes).map(|i| self.index_for(key, i)).collect()
    }

    pub fn insert(&mut self, key: &FlowKey) {
        for i in 0..self.arrays.len() {
            let idx = self.index_for(key, i);
            self.arrays[i].set(idx);
        }
    }

    pub fn query(&self, key: &FlowKey) -> bool {
        self.arrays
            .iter()
            .enumerate()
            .all(|(i, arr)| arr.get(self.index_for(key, i)))
    }

    /// Runs exactly one of insert / query.
    pub fn apply(&mut self, mode: FilterMode, key: &FlowKey) -> Outcome {
        match mode {
            FilterMode::Insert => {
                self.insert(key);
                Outcome::Inserted
            }
            FilterMode::Query => Outcome::Queried { member: self.query(key) },
        }
    }

    pub fn reset(&mut self) {
        for arr in &mut self.arrays {
            arr.clear();
        }
        tracing::debug!(n = self.config.num_entries, k = self.config.num_hashes, "filter reset");
    }

    /// ORs `other` into `self`, array by array. Both filters must share shape
    /// and hash family for the result to answer for keys of either side.
    pub fn merge(&mut self, other: &MultiHashBloomFilter<H>) -> Result<()> {
        if self.config != other.config {
            return Err(SeenError::ShapeMismatch {
                k: self.config.num_hashes,
                n: self.config.num_entries,
                other_k: other.config.num_hashes,
                other_n: other.config.num_entries,
            });
        }
        for (mine, theirs) in self.arrays.iter_mut().zip(&other.arrays) {
            mine.union_with(theirs);
        }
        tracing::debug!(ones = self.count_ones(), "filter merged");
        Ok(())
    }

    pub fn ones_per_array(&self) -> Vec<usize> {
        self.arrays.iter().map(BitArray::count_ones).collect()
    }

    pub fn count_ones(&self) -> usize {
        self.arrays.iter().map(BitArray::count_ones).sum()
    }

    /// Set bits over all bits.
    pub fn fill_ratio(&self) -> f64 {
        let total = (self.config.num_entries * self.config.num_hashes) as f64;
        self.count_ones() as f64 / total
    }

    /// Probability a fresh key hits a set bit in every array, from current fill.
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let n = self.config.num_entries as f64;
        self.arrays.iter().map(|a| a.count_ones() as f64 / n).product()
    }
}

/// Applies the packet's mode and reports the result without touching the packet.
pub fn classify<H: FlowHasher>(filter: &mut MultiHashBloomFilter<H>, packet: &Packet) -> Classification {
    let member = match filter.apply(packet.mode, &packet.key()) {
        Outcome::Inserted => None,
        Outcome::Queried { member } => Some(member),
    };
    Classification { sport: packet.sport, dport: packet.dport, mode: packet.mode, member }
}
