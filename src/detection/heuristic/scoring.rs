//! Additive heuristic scoring for files with no signature match.
//!
//! Rules and weights:
//! - entropy of the leading sample above the threshold: +30
//! - suspicious extension: +50
//! - double extension (`report.pdf.exe`): +40
//! - file smaller than the size floor: +20
//!
//! A file is suspicious once the total exceeds the threshold (50).

use super::entropy::{self, EntropyLevel};
use crate::core::config::HeuristicConfig;
use crate::core::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::path::Path;

pub const ENTROPY_WEIGHT: u32 = 30;
pub const EXTENSION_WEIGHT: u32 = 50;
pub const DOUBLE_EXTENSION_WEIGHT: u32 = 40;
pub const SMALL_FILE_WEIGHT: u32 = 20;

const DOUBLE_EXTENSION_PATTERN: &str = r".*\.[a-z]{2,4}\.[a-z]{2,4}$";

/// Score and the indicators that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeuristicResult {
    pub score: u32,
    pub indicators: Vec<String>,
    /// Entropy of the sampled bytes
    pub entropy: f64,
    pub suspicious: bool,
}

impl HeuristicResult {
    fn add_indicator(&mut self, description: String, weight: u32) {
        self.indicators.push(description);
        self.score += weight;
    }

    /// One-line summary of the findings.
    pub fn summary(&self) -> String {
        if self.indicators.is_empty() {
            format!("Score: {}", self.score)
        } else {
            format!("Score: {} ({})", self.score, self.indicators.join("; "))
        }
    }
}

/// Deterministic scorer; holds only configuration and a compiled pattern.
#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    config: HeuristicConfig,
    extensions: Vec<String>,
    double_extension: Regex,
}

impl HeuristicScorer {
    pub fn new(config: HeuristicConfig) -> Result<Self> {
        let double_extension = Regex::new(DOUBLE_EXTENSION_PATTERN)
            .map_err(|e| Error::Internal(format!("Invalid double extension pattern: {}", e)))?;
        let extensions = config
            .suspicious_extensions
            .iter()
            .map(|ext| ext.to_lowercase())
            .collect();

        Ok(Self {
            config,
            extensions,
            double_extension,
        })
    }

    /// Bytes of leading content the scorer wants to see.
    pub fn sample_size(&self) -> usize {
        self.config.entropy_sample_bytes
    }

    /// Score a file from its name, total size and leading sample.
    pub fn score(&self, file_name: &str, size: u64, sample: &[u8]) -> HeuristicResult {
        let mut result = HeuristicResult {
            score: 0,
            indicators: Vec::new(),
            entropy: 0.0,
            suspicious: false,
        };

        let sample = &sample[..sample.len().min(self.config.entropy_sample_bytes)];
        result.entropy = entropy::shannon_entropy(sample);
        if result.entropy > self.config.entropy_threshold {
            result.add_indicator(
                format!(
                    "{} entropy: {:.2}",
                    EntropyLevel::classify(result.entropy),
                    result.entropy
                ),
                ENTROPY_WEIGHT,
            );
        }

        let name = file_name.to_lowercase();
        if let Some(ext) = self.extensions.iter().find(|ext| name.ends_with(ext.as_str())) {
            result.add_indicator(format!("Suspicious extension: {}", ext), EXTENSION_WEIGHT);
        }

        if self.double_extension.is_match(&name) {
            result.add_indicator("Double file extension".to_string(), DOUBLE_EXTENSION_WEIGHT);
        }

        if size < self.config.small_file_bytes {
            result.add_indicator(format!("Unusually small file: {} bytes", size), SMALL_FILE_WEIGHT);
        }

        result.suspicious = result.score > self.config.suspicious_threshold;
        result
    }

    /// Read the leading sample of `path` and score it.
    pub fn score_file(&self, path: &Path, size: u64) -> Result<HeuristicResult> {
        let sample = entropy::read_sample(path, self.config.entropy_sample_bytes)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.score(&name, size, &sample))
    }
}
