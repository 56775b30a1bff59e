//! Malware detection engines and algorithms.
//!
//! This module provides:
//! - Signature storage (bloom filter pre-check plus exact index)
//! - On-disk persistence and the refresh hook
//! - Heuristic analysis (entropy, filename and size cues)

pub mod bloom;
pub mod database;
pub mod heuristic;
pub mod persist;
pub mod refresh;
pub mod signature;

pub use bloom::BloomFilter;
pub use database::{DatabaseStats, ImportResult, SignatureDatabase};
pub use heuristic::{HeuristicResult, HeuristicScorer};
pub use refresh::{refresh_and_reload, DatabaseRefresher};
pub use signature::{Signature, SignatureFeed};
