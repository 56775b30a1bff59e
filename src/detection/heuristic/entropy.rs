//! Shannon entropy of leading file content.
//!
//! Values near 8.0 mean the bytes are close to uniformly random, which is
//! what encrypted or packed payloads look like. Plain text sits around 4-5.

use crate::core::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const ENTROPY_LOW: f64 = 5.0;
pub const ENTROPY_NORMAL: f64 = 6.5;
pub const ENTROPY_HIGH: f64 = 7.0;
pub const ENTROPY_VERY_HIGH: f64 = 7.5;
pub const ENTROPY_MAX: f64 = 8.0;

/// Default number of leading bytes sampled (1 MiB).
pub const DEFAULT_SAMPLE_BYTES: usize = 1024 * 1024;

/// Shannon entropy in bits per byte over a 256-bin histogram, in [0, 8].
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut histogram = [0u64; 256];
    for &byte in data {
        histogram[byte as usize] += 1;
    }

    let len = data.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Read at most `limit` leading bytes of a file.
pub fn read_sample(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
    let mut sample = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64)
        .read_to_end(&mut sample)
        .map_err(|e| Error::file_read(path, e))?;
    Ok(sample)
}

/// Coarse entropy band, used in indicator text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyLevel {
    /// < 5.0: text, structured data
    Low,
    /// 5.0-6.5: typical executable code
    Normal,
    /// 6.5-7.0: some compression or encoding
    Elevated,
    /// 7.0-7.5: likely packed
    High,
    /// >= 7.5: encrypted or compressed
    VeryHigh,
}

impl EntropyLevel {
    pub fn classify(entropy: f64) -> Self {
        if entropy < ENTROPY_LOW {
            EntropyLevel::Low
        } else if entropy < ENTROPY_NORMAL {
            EntropyLevel::Normal
        } else if entropy < ENTROPY_HIGH {
            EntropyLevel::Elevated
        } else if entropy < ENTROPY_VERY_HIGH {
            EntropyLevel::High
        } else {
            EntropyLevel::VeryHigh
        }
    }
}

impl std::fmt::Display for EntropyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntropyLevel::Low => write!(f, "Low"),
            EntropyLevel::Normal => write!(f, "Normal"),
            EntropyLevel::Elevated => write!(f, "Elevated"),
            EntropyLevel::High => write!(f, "High"),
            EntropyLevel::VeryHigh => write!(f, "Very High"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    use std::io::Write;

    #[test]
    fn test_single_byte_value_is_zero() {
        let data = vec![0x41u8; 1024];
        assert_eq!(shannon_entropy(&data), 0.0);
    }

    #[test]
    fn test_random_bytes_are_high() {
        let mut data = vec![0u8; 1024];
        rand::thread_rng().fill_bytes(&mut data);
        assert!(shannon_entropy(&data) > 7.0);
    }

    #[test]
    fn test_uniform_distribution_is_max() {
        let data: Vec<u8> = (0..=255u8).collect::<Vec<_>>().repeat(4);
        assert!((shannon_entropy(&data) - ENTROPY_MAX).abs() < 1e-9);
    }

    #[test]
    fn test_text_entropy() {
        let text = b"The quick brown fox jumps over the lazy dog. This is sample text for testing entropy calculation.";
        let entropy = shannon_entropy(text);
        assert!(entropy > 3.5 && entropy < 5.5);
        assert_eq!(EntropyLevel::classify(entropy), EntropyLevel::Low);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn test_classification() {
        assert_eq!(EntropyLevel::classify(5.5), EntropyLevel::Normal);
        assert_eq!(EntropyLevel::classify(6.8), EntropyLevel::Elevated);
        assert_eq!(EntropyLevel::classify(7.2), EntropyLevel::High);
        assert_eq!(EntropyLevel::classify(7.8), EntropyLevel::VeryHigh);
    }

    #[test]
    fn test_read_sample_is_bounded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 4096]).unwrap();

        assert_eq!(read_sample(file.path(), 1000).unwrap().len(), 1000);
        assert_eq!(read_sample(file.path(), 10_000).unwrap().len(), 4096);
    }
}
