//! Fixed-length packed bit array, LSB-first within each byte.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitArray {
    len: usize,
    bits: Vec<u8>,
}

impl BitArray {
    pub fn new(len: usize) -> Self {
        Self { len, bits: vec![0u8; len.div_ceil(8)] }
    }

    /// Rebuilds an array from packed bytes. `None` if the byte count does not
    /// match `len` or any padding bit past `len` is set.
    pub fn from_bytes(len: usize, bits: Vec<u8>) -> Option<Self> {
        if bits.len() != len.div_ceil(8) { return None; }
        let tail = len % 8;
        if tail != 0 {
            let last = *bits.last()?;
            if last >> tail != 0 { return None; }
        }
        Some(Self { len, bits })
    }

    #[inline]
    pub fn len(&self) -> usize { self.len }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] { &self.bits }

    /// Caller guarantees `idx < len`.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        (self.bits[idx >> 3] & (1u8 << (idx & 7))) != 0
    }

    #[inline]
    pub fn set(&mut self, idx: usize) {
        debug_assert!(idx < self.len);
        self.bits[idx >> 3] |= 1u8 << (idx & 7);
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Bitwise OR; both arrays must have the same length.
    pub fn union_with(&mut self, other: &BitArray) {
        debug_assert_eq!(self.len, other.len);
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a |= *b;
        }
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }
}
