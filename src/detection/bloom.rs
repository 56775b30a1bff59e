//! Bloom filter used as the membership pre-filter of the signature store.
//!
//! Bit positions come from double hashing (`h1 + i * h2`) over a seeded
//! SHA-256 of the item, so a filter written to disk answers identically
//! after it is read back on any platform.

use crate::core::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

/// Upper bound on hash functions regardless of the requested error rate.
const MAX_HASHES: u32 = 30;

/// Upper bound on the bit array accepted from disk (128 GiB of bits).
const MAX_BITS: u64 = 1 << 40;

/// Word capacity reserved up front when reading; the rest grows as words arrive.
const READ_CHUNK_WORDS: u64 = 1 << 16;

/// Default seed for newly created filters.
pub const DEFAULT_SEED: u64 = 0x5eed_0f_b1_00_f1_17;

/// A fixed-size probabilistic set of strings.
///
/// May answer `true` for items never inserted, never `false` for inserted ones.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilter {
    words: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    seed: u64,
}

impl BloomFilter {
    /// Create a filter sized for `expected_items` at the given false-positive rate.
    pub fn with_rate(expected_items: u64, false_positive_rate: f64) -> Self {
        let (num_bits, num_hashes) = optimal_parameters(expected_items, false_positive_rate);
        Self::with_parameters(num_bits, num_hashes, DEFAULT_SEED)
    }

    /// Create a filter with explicit bit count, hash count, and seed.
    pub fn with_parameters(num_bits: u64, num_hashes: u32, seed: u64) -> Self {
        let num_bits = num_bits.max(64);
        let word_count = num_bits.div_ceil(64) as usize;
        Self {
            words: vec![0u64; word_count],
            num_bits,
            num_hashes: num_hashes.clamp(1, MAX_HASHES),
            seed,
        }
    }

    /// Insert an item.
    pub fn insert(&mut self, item: &str) {
        let (h1, h2) = self.base_hashes(item);
        for i in 0..self.num_hashes as u64 {
            let bit = self.position(h1, h2, i);
            self.words[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    /// Probe for an item; costs `num_hashes` bit reads.
    pub fn might_contain(&self, item: &str) -> bool {
        let (h1, h2) = self.base_hashes(item);
        (0..self.num_hashes as u64).all(|i| {
            let bit = self.position(h1, h2, i);
            self.words[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }

    /// Reset every bit.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of set bits.
    pub fn bit_count(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// Estimate of distinct items inserted, from the fill ratio.
    pub fn approximate_element_count(&self) -> u64 {
        let set = self.bit_count() as f64;
        let m = self.num_bits as f64;
        let k = self.num_hashes as f64;
        if set >= m {
            return u64::MAX;
        }
        (-(m / k) * (1.0 - set / m).ln()).round() as u64
    }

    /// Write the self-describing body: bit length, hash count, seed, then the words.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.num_bits.to_le_bytes())?;
        writer.write_all(&self.num_hashes.to_le_bytes())?;
        writer.write_all(&self.seed.to_le_bytes())?;
        writer.write_all(&(self.words.len() as u64).to_le_bytes())?;
        for word in &self.words {
            writer.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Read a body written by [`BloomFilter::write_to`].
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let num_bits = read_u64(reader)?;
        let num_hashes = read_u32(reader)?;
        let seed = read_u64(reader)?;
        let word_count = read_u64(reader)?;

        if num_bits < 64 || num_bits > MAX_BITS {
            return Err(Error::format(format!("Bloom filter bit length out of range: {}", num_bits)));
        }
        if num_hashes == 0 || num_hashes > MAX_HASHES {
            return Err(Error::format(format!("Bloom filter hash count out of range: {}", num_hashes)));
        }
        if word_count != num_bits.div_ceil(64) {
            return Err(Error::format(format!(
                "Bloom filter word count {} does not match bit length {}",
                word_count, num_bits
            )));
        }

        // The header is untrusted; a truncated body must fail on read, not on allocation.
        let mut words = Vec::with_capacity(word_count.min(READ_CHUNK_WORDS) as usize);
        for _ in 0..word_count {
            words.push(read_u64(reader)?);
        }

        Ok(Self {
            words,
            num_bits,
            num_hashes,
            seed,
        })
    }

    fn base_hashes(&self, item: &str) -> (u64, u64) {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(item.as_bytes());
        let digest = hasher.finalize();

        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        first.copy_from_slice(&digest[0..8]);
        second.copy_from_slice(&digest[8..16]);
        // Odd step so successive probes never collapse onto one bit.
        (u64::from_le_bytes(first), u64::from_le_bytes(second) | 1)
    }

    fn position(&self, h1: u64, h2: u64, i: u64) -> u64 {
        h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits
    }
}

/// Bit count and hash count for `n` items at false-positive rate `p`.
pub fn optimal_parameters(expected_items: u64, false_positive_rate: f64) -> (u64, u32) {
    let n = expected_items.max(1) as f64;
    let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5);
    let ln2 = std::f64::consts::LN_2;

    let m = (-n * p.ln() / (ln2 * ln2)).ceil().max(64.0);
    let k = ((m / n) * ln2).round().max(1.0) as u32;
    (m as u64, k.min(MAX_HASHES))
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|e| Error::format(format!("Truncated database file: {}", e)))?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| Error::format(format!("Truncated database file: {}", e)))?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimal_parameters() {
        // 10M items at 0.1%: ~14.38 bits per item, 10 hash functions.
        let (bits, hashes) = optimal_parameters(10_000_000, 0.001);
        assert!(bits > 143_000_000 && bits < 144_500_000);
        assert_eq!(hashes, 10);
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::with_rate(1_000, 0.001);
        let items: Vec<String> = (0..1_000).map(|i| format!("digest-{}", i)).collect();
        for item in &items {
            filter.insert(item);
        }
        assert!(items.iter().all(|i| filter.might_contain(i)));
    }

    #[test]
    fn test_false_positive_rate_is_bounded() {
        let mut filter = BloomFilter::with_rate(2_000, 0.01);
        for i in 0..2_000 {
            filter.insert(&format!("member-{}", i));
        }

        let false_positives = (0..10_000)
            .filter(|i| filter.might_contain(&format!("stranger-{}", i)))
            .count();
        // Expected ~100; leave generous headroom.
        assert!(false_positives < 300, "too many false positives: {}", false_positives);
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = BloomFilter::with_rate(100, 0.001);
        assert!(!filter.might_contain("anything"));
        assert_eq!(filter.approximate_element_count(), 0);
    }

    #[test]
    fn test_approximate_count() {
        let mut filter = BloomFilter::with_rate(10_000, 0.001);
        for i in 0..5_000 {
            filter.insert(&i.to_string());
        }
        let estimate = filter.approximate_element_count();
        assert!((4_800..=5_200).contains(&estimate), "estimate {}", estimate);
    }

    #[test]
    fn test_seed_changes_positions() {
        let mut a = BloomFilter::with_parameters(4096, 4, 1);
        let mut b = BloomFilter::with_parameters(4096, 4, 2);
        a.insert("same");
        b.insert("same");
        assert_ne!(a.words, b.words);
    }

    #[test]
    fn test_body_round_trip() {
        let mut filter = BloomFilter::with_rate(500, 0.001);
        filter.insert("alpha");
        filter.insert("beta");

        let mut buf = Vec::new();
        filter.write_to(&mut buf).unwrap();
        let restored = BloomFilter::read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(restored, filter);
        assert!(restored.might_contain("alpha"));
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let filter = BloomFilter::with_rate(500, 0.001);
        let mut buf = Vec::new();
        filter.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);

        assert!(matches!(
            BloomFilter::read_from(&mut buf.as_slice()),
            Err(Error::DatabaseFormat(_))
        ));
    }

    #[test]
    fn test_oversized_header_without_body_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAX_BITS.to_le_bytes());
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&DEFAULT_SEED.to_le_bytes());
        bytes.extend_from_slice(&MAX_BITS.div_ceil(64).to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());

        let err = BloomFilter::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::DatabaseFormat(_)));
    }

    #[test]
    fn test_clear() {
        let mut filter = BloomFilter::with_rate(100, 0.01);
        filter.insert("x");
        filter.clear();
        assert_eq!(filter.bit_count(), 0);
        assert!(!filter.might_contain("x"));
    }
}
