//! veriscan: an on-device malware detection engine.
//!
//! Files are hashed with several digest algorithms in one pass and checked
//! against a signature store that keeps a bloom filter in front of an exact
//! index. Files with no match are scored heuristically. Batches run on a
//! worker pool, and a realtime monitor scans files as they change on disk.

pub mod core;
pub mod detection;
pub mod realtime;
pub mod scanner;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use crate::core::types::*;
pub use crate::detection::{Signature, SignatureDatabase};
pub use crate::realtime::{RealtimeEvent, RealtimeMonitor};
pub use crate::scanner::{ScanEngine, ScanEvent, ScanResult};
pub use crate::utils::hash::{DigestEngine, DigestSet};
