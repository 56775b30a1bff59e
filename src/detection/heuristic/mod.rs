//! Heuristic detection for files with no signature match.
//!
//! - Entropy of leading content (packed/encrypted payloads)
//! - Filename cues (executable and double extensions)
//! - Size anomalies

pub mod entropy;
pub mod scoring;

pub use entropy::{shannon_entropy, EntropyLevel};
pub use scoring::{HeuristicResult, HeuristicScorer};
