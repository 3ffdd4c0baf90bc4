//! Fixed-width Bloom filter used as a similarity-preserving attribute encoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{ErlinkError, ErlinkResult};

const WORD_BITS: usize = 64;

/// A Bloom filter of `width` bits populated by `hashes` seeded hash functions.
///
/// Only [`BloomFilter::insert`] mutates the bit array, and it only ever sets
/// bits, so the population count never decreases.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BloomFilter {
    width: usize,
    hashes: usize,
    seed: u64,
    words: Vec<u64>,
}

impl BloomFilter {
    pub fn new(width: usize, hashes: usize) -> ErlinkResult<Self> {
        Self::with_seed(width, hashes, 0)
    }

    pub fn with_seed(width: usize, hashes: usize, seed: u64) -> ErlinkResult<Self> {
        if width == 0 {
            return Err(ErlinkError::InvalidArgument("filter width must be > 0".into()));
        }
        if hashes == 0 {
            return Err(ErlinkError::InvalidArgument("filter hash count must be > 0".into()));
        }
        Ok(Self {
            width,
            hashes,
            seed,
            words: vec![0; width.div_ceil(WORD_BITS)],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn hashes(&self) -> usize {
        self.hashes
    }

    /// Set the `hashes` bits selected for `value`.
    pub fn insert(&mut self, value: &str) {
        for i in 0..self.hashes {
            let bit = self.bit_index(value, i);
            self.set(bit);
        }
    }

    /// True when every bit selected for `value` is set.
    pub fn contains(&self, value: &str) -> bool {
        (0..self.hashes).all(|i| self.get(self.bit_index(value, i)))
    }

    pub fn get(&self, bit: usize) -> bool {
        bit < self.width && self.words[bit / WORD_BITS] & (1u64 << (bit % WORD_BITS)) != 0
    }

    fn set(&mut self, bit: usize) {
        self.words[bit / WORD_BITS] |= 1u64 << (bit % WORD_BITS);
    }

    /// `h_i(value) mod width`, with an independent seed per hash index.
    fn bit_index(&self, value: &str, i: usize) -> usize {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update((i as u64).to_le_bytes());
        hasher.update(value.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(head) % self.width as u64) as usize
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Indices of set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.width).filter(move |&bit| self.get(bit))
    }

    fn check_comparable(&self, other: &BloomFilter) -> ErlinkResult<()> {
        if self.width != other.width {
            return Err(ErlinkError::InvalidArgument(format!(
                "filter widths differ: {} vs {}",
                self.width, other.width
            )));
        }
        Ok(())
    }

    /// Popcount of the elementwise AND.
    pub fn intersection_count(&self, other: &BloomFilter) -> ErlinkResult<usize> {
        self.check_comparable(other)?;
        Ok(self
            .words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a & b).count_ones() as usize)
            .sum())
    }

    /// Dice coefficient `2|A∩B| / (|A| + |B|)`; two empty filters score 0.
    pub fn dice(&self, other: &BloomFilter) -> ErlinkResult<f64> {
        let shared = self.intersection_count(other)?;
        let total = self.count_ones() + other.count_ones();
        if total == 0 {
            return Ok(0.0);
        }
        Ok(2.0 * shared as f64 / total as f64)
    }

    /// OR `other` into this filter.
    pub fn union_with(&mut self, other: &BloomFilter) -> ErlinkResult<()> {
        self.check_comparable(other)?;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
        Ok(())
    }

    /// Bits as a numeric vector, in bit-index order, for clustering.
    pub fn to_vector(&self) -> Vec<f32> {
        (0..self.width)
            .map(|bit| if self.get(bit) { 1.0 } else { 0.0 })
            .collect()
    }

    /// Bit string with the highest position first (bitset order).
    pub fn to_bit_string(&self) -> String {
        (0..self.width)
            .rev()
            .map(|bit| if self.get(bit) { '1' } else { '0' })
            .collect()
    }

    /// Inverse of [`BloomFilter::to_bit_string`]. The width is the string length.
    pub fn from_bit_string(bits: &str, hashes: usize, seed: u64) -> ErlinkResult<Self> {
        let mut filter = Self::with_seed(bits.len(), hashes, seed)?;
        let width = filter.width;
        for (offset, ch) in bits.chars().enumerate() {
            match ch {
                '1' => filter.set(width - 1 - offset),
                '0' => {}
                other => {
                    return Err(ErlinkError::Filter(format!(
                        "unexpected character {other:?} at offset {offset}"
                    )))
                }
            }
        }
        Ok(filter)
    }
}
