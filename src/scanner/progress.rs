//! Scan statistics and progress reporting.

use crate::core::types::ScanStatus;
use crate::scanner::listener::{Listener, ScanEvent};
use crate::scanner::result::ScanResult;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub files_scanned: u64,
    pub threats_detected: u64,
    pub suspicious: u64,
    pub clean: u64,
    pub skipped: u64,
    pub errors: u64,
    pub bytes_scanned: u64,
}

/// Cumulative counters, updated concurrently by scan workers.
///
/// Every recorded result increments `files_scanned` exactly once.
#[derive(Debug, Default)]
pub struct EngineStatistics {
    files_scanned: AtomicU64,
    threats_detected: AtomicU64,
    suspicious: AtomicU64,
    clean: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    bytes_scanned: AtomicU64,
}

impl EngineStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one terminal result.
    pub fn record(&self, result: &ScanResult) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        let counter = match result.status {
            ScanStatus::ThreatDetected => &self.threats_detected,
            ScanStatus::Suspicious => &self.suspicious,
            ScanStatus::Clean => &self.clean,
            ScanStatus::Skipped => &self.skipped,
            ScanStatus::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if matches!(
            result.status,
            ScanStatus::Clean | ScanStatus::Suspicious | ScanStatus::ThreatDetected
        ) {
            self.bytes_scanned.fetch_add(result.size, Ordering::Relaxed);
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.files_scanned,
            &self.threats_detected,
            &self.suspicious,
            &self.clean,
            &self.skipped,
            &self.errors,
            &self.bytes_scanned,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            threats_detected: self.threats_detected.load(Ordering::Relaxed),
            suspicious: self.suspicious.load(Ordering::Relaxed),
            clean: self.clean.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
        }
    }
}

/// Final tally of one batch, carried by `ScanEvent::Completed`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub total_files: usize,
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub threats_detected: u64,
    pub suspicious: u64,
    pub clean: u64,
    pub skipped: u64,
    pub errors: u64,
    pub duration_ms: u64,
    /// True when the batch was ended by `stop_scan`
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn new(
        batch_id: Uuid,
        total_files: usize,
        stats: StatisticsSnapshot,
        elapsed: Duration,
        cancelled: bool,
    ) -> Self {
        Self {
            batch_id,
            total_files,
            files_scanned: stats.files_scanned,
            bytes_scanned: stats.bytes_scanned,
            threats_detected: stats.threats_detected,
            suspicious: stats.suspicious,
            clean: stats.clean,
            skipped: stats.skipped,
            errors: stats.errors,
            duration_ms: elapsed.as_millis() as u64,
            cancelled,
        }
    }

    /// Files per second over the batch.
    pub fn files_per_second(&self) -> f64 {
        if self.duration_ms == 0 {
            return self.files_scanned as f64;
        }
        self.files_scanned as f64 * 1000.0 / self.duration_ms as f64
    }

    /// Threats plus suspicious files.
    pub fn findings(&self) -> u64 {
        self.threats_detected + self.suspicious
    }
}

/// Console progress reporter.
///
/// Rewrites a single status line on stderr as `Progress` events arrive.
pub struct ConsoleProgressReporter {
    total_files: AtomicUsize,
    threats: AtomicU64,
    start_time: Mutex<Instant>,
    last_line_length: AtomicUsize,
    verbose: bool,
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProgressReporter {
    pub fn new() -> Self {
        Self {
            total_files: AtomicUsize::new(0),
            threats: AtomicU64::new(0),
            start_time: Mutex::new(Instant::now()),
            last_line_length: AtomicUsize::new(0),
            verbose: false,
        }
    }

    /// Print every finding as it arrives.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    fn elapsed(&self) -> Duration {
        self.start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn status_line(&self, files_scanned: u64, label: &str) -> String {
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            files_scanned as f64 / secs
        } else {
            0.0
        };
        let total = self.total_files.load(Ordering::Relaxed);
        let pct = if total > 0 {
            (files_scanned as f64 / total as f64) * 100.0
        } else {
            100.0
        };

        format!(
            "\r[{}] {:.1}% | Files: {}/{} | Threats: {} | Rate: {:.0}/s | Time: {}s",
            label,
            pct,
            files_scanned,
            total,
            self.threats.load(Ordering::Relaxed),
            rate,
            elapsed.as_secs()
        )
    }

    fn print_line(&self, message: String) {
        let last_len = self.last_line_length.load(Ordering::Relaxed);
        let padding = if message.len() < last_len {
            " ".repeat(last_len - message.len())
        } else {
            String::new()
        };

        eprint!("{}{}", message, padding);
        self.last_line_length.store(message.len(), Ordering::Relaxed);
    }
}

impl Listener<ScanEvent> for ConsoleProgressReporter {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::Started { total_files, .. } => {
                self.total_files.store(*total_files, Ordering::Relaxed);
                self.threats.store(0, Ordering::Relaxed);
                *self.start_time.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
            }
            ScanEvent::Progress { files_scanned, .. } => {
                self.print_line(self.status_line(*files_scanned, "Scanning"));
            }
            ScanEvent::ThreatDetected(result) => {
                self.threats.fetch_add(1, Ordering::Relaxed);
                if self.verbose {
                    eprintln!("\n  [!] {}", result);
                }
            }
            ScanEvent::Completed(summary) => {
                let label = if summary.cancelled { "Cancelled" } else { "Complete" };
                self.print_line(self.status_line(summary.files_scanned, label));
                eprintln!();
            }
            ScanEvent::Error(message) => {
                eprintln!("\n  [x] {}", message);
            }
            ScanEvent::FileScanned(_) => {}
        }
    }
}
