//! File scanning.
//!
//! This module provides:
//! - The scan engine (single files and concurrent batches)
//! - ZIP container analysis
//! - An optional external engine delegate
//! - Event listeners and progress reporting
//! - A worker pool for background scans

pub mod archive;
pub mod container;
pub mod engine;
pub mod external;
pub mod listener;
pub mod pool;
pub mod progress;
pub mod result;

pub use archive::ArchiveAnalyzer;
pub use container::{ContainerAnalyzer, ContainerMatch};
pub use engine::ScanEngine;
pub use external::ExternalEngineAnalyzer;
pub use listener::{Listener, ListenerId, ListenerSet, ScanEvent};
pub use pool::WorkerPool;
pub use progress::{BatchSummary, ConsoleProgressReporter, EngineStatistics, StatisticsSnapshot};
pub use result::ScanResult;
