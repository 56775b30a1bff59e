//! Scan engine: per-file pipeline and concurrent batch scanning.
//!
//! Each file goes through, in order:
//! 1. metadata and size limit
//! 2. multi-digest signature lookup
//! 3. heuristic scoring
//! 4. registered container analyzers and the optional external engine
//!
//! Batches run on a fixed set of worker threads draining a shared queue.
//! Exactly one `Completed` event is emitted per batch, whether it ran to
//! the end or was stopped.

use crate::core::config::{Config, ScanConfig};
use crate::core::error::{Error, Result};
use crate::detection::{HeuristicScorer, SignatureDatabase};
use crate::scanner::archive::ArchiveAnalyzer;
use crate::scanner::container::ContainerAnalyzer;
use crate::scanner::external::ExternalEngineAnalyzer;
use crate::scanner::listener::{Listener, ListenerId, ListenerSet, ScanEvent};
use crate::scanner::progress::{BatchSummary, EngineStatistics, StatisticsSnapshot};
use crate::scanner::result::ScanResult;
use crate::utils::hash::DigestEngine;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How often `stop_scan` checks whether workers have exited.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared scan engine. Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct ScanEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: ScanConfig,
    db: Arc<SignatureDatabase>,
    scorer: HeuristicScorer,
    analyzers: RwLock<Vec<Arc<dyn ContainerAnalyzer>>>,
    listeners: ListenerSet<ScanEvent>,
    stats: EngineStatistics,
    batch: Mutex<Option<BatchState>>,
    scanning: AtomicBool,
}

struct BatchState {
    tracker: Arc<BatchTracker>,
    handles: Vec<JoinHandle<()>>,
}

struct BatchTracker {
    id: Uuid,
    total: usize,
    completed: AtomicUsize,
    cancelled: AtomicBool,
    fired: AtomicBool,
    /// Held while a worker reports a result and while `fired` is claimed.
    report: Mutex<()>,
    /// Counts this batch only; realtime scans go to the engine totals.
    stats: EngineStatistics,
    started: Instant,
}

impl ScanEngine {
    /// Build an engine over a shared signature store.
    pub fn new(config: &Config, db: Arc<SignatureDatabase>) -> Result<Self> {
        let scorer = HeuristicScorer::new(config.heuristics.clone())?;

        let mut analyzers: Vec<Arc<dyn ContainerAnalyzer>> = Vec::new();
        if config.scan.scan_archives {
            analyzers.push(Arc::new(ArchiveAnalyzer::from_config(&config.scan)));
        }
        let external = &config.scan.external_engine;
        if external.enabled {
            match ExternalEngineAnalyzer::from_config(external) {
                Some(analyzer) => {
                    log::info!("Using external engine {:?}", analyzer.program());
                    analyzers.push(Arc::new(analyzer));
                }
                None => log::warn!("External engine '{}' not found; skipping it", external.program),
            }
        }

        Ok(Self {
            inner: Arc::new(EngineInner {
                config: config.scan.clone(),
                db,
                scorer,
                analyzers: RwLock::new(analyzers),
                listeners: ListenerSet::new(),
                stats: EngineStatistics::new(),
                batch: Mutex::new(None),
                scanning: AtomicBool::new(false),
            }),
        })
    }

    pub fn database(&self) -> &Arc<SignatureDatabase> {
        &self.inner.db
    }

    pub fn register_analyzer(&self, analyzer: Arc<dyn ContainerAnalyzer>) {
        log::debug!("Registered container analyzer '{}'", analyzer.name());
        self.inner
            .analyzers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(analyzer);
    }

    /// Batch events are delivered on worker threads. A listener must not call
    /// `stop_scan` from inside `on_event`.
    pub fn add_listener(&self, listener: impl Listener<ScanEvent> + 'static) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn add_shared_listener(&self, listener: Arc<dyn Listener<ScanEvent>>) -> ListenerId {
        self.inner.listeners.add_arc(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Receive every event on a channel. Dropping the receiver detaches it.
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        self.inner.listeners.subscribe()
    }

    /// Scan one file without touching statistics or listeners.
    pub fn scan_path(&self, path: &Path) -> ScanResult {
        self.inner.scan_one(path)
    }

    /// Scan one file, count it and notify listeners of a threat.
    pub fn scan_file(&self, path: &Path) -> ScanResult {
        let result = self.inner.scan_one(path);
        self.inner.stats.record(&result);
        if result.status.is_threat() {
            self.inner.listeners.emit(&ScanEvent::ThreatDetected(result.clone()));
        }
        result
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::SeqCst)
    }

    /// Totals for batch and single-file scans since the last batch start or reset.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.inner.stats.reset();
    }

    /// Start a background batch scan and return its id.
    ///
    /// Only one batch runs at a time; a second request is rejected and
    /// reported to listeners as an `Error` event.
    pub fn start_scan(&self, files: Vec<PathBuf>) -> Result<Uuid> {
        let inner = &self.inner;
        if inner
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Rejected scan request: a batch is already running");
            inner
                .listeners
                .emit(&ScanEvent::Error("Scan already in progress".to_string()));
            return Err(Error::ScanAlreadyInProgress);
        }

        inner.stats.reset();
        let tracker = Arc::new(BatchTracker {
            id: Uuid::new_v4(),
            total: files.len(),
            completed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            report: Mutex::new(()),
            stats: EngineStatistics::default(),
            started: Instant::now(),
        });
        let batch_id = tracker.id;

        log::info!("Starting batch {} with {} files", batch_id, files.len());
        inner.listeners.emit(&ScanEvent::Started {
            batch_id,
            total_files: files.len(),
        });

        if files.is_empty() {
            inner.finish_batch(&tracker, false);
            return Ok(batch_id);
        }

        // Registered before any worker can finish the batch.
        *inner.batch.lock().unwrap_or_else(PoisonError::into_inner) = Some(BatchState {
            tracker: Arc::clone(&tracker),
            handles: Vec::new(),
        });

        let num_workers = inner.config.worker_threads.clamp(1, files.len());
        let queue = Arc::new(Mutex::new(files.into_iter().collect::<VecDeque<_>>()));
        let mut handles = Vec::with_capacity(num_workers);

        for idx in 0..num_workers {
            let worker_inner = Arc::clone(inner);
            let worker_tracker = Arc::clone(&tracker);
            let worker_queue = Arc::clone(&queue);

            let spawned = thread::Builder::new()
                .name(format!("veriscan-scan-{}", idx))
                .spawn(move || worker_inner.run_worker(&worker_queue, &worker_tracker));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    log::error!("Failed to spawn scan worker {}: {}", idx, e);
                    break;
                }
            }
        }

        if handles.is_empty() {
            inner.batch.lock().unwrap_or_else(PoisonError::into_inner).take();
            tracker.fired.store(true, Ordering::SeqCst);
            inner.scanning.store(false, Ordering::SeqCst);
            return Err(Error::Internal("No scan workers could be started".to_string()));
        }

        let mut batch = inner.batch.lock().unwrap_or_else(PoisonError::into_inner);
        match batch.as_mut() {
            Some(state) if state.tracker.id == batch_id => state.handles = handles,
            // Batch already finished or was stopped; the workers exit on their own.
            _ => drop(handles),
        }

        Ok(batch_id)
    }

    /// Cancel the running batch.
    ///
    /// Queued files are abandoned. In-flight files get the configured grace
    /// period; workers still busy afterwards are detached and their results
    /// discarded. `Completed` fires with `cancelled` set unless the batch had
    /// already finished.
    pub fn stop_scan(&self) {
        let state = self
            .inner
            .batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(state) = state else {
            return;
        };

        log::info!("Stopping batch {}", state.tracker.id);
        state.tracker.cancelled.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + self.inner.config.stop_grace();
        while Instant::now() < deadline && state.handles.iter().any(|h| !h.is_finished()) {
            thread::sleep(STOP_POLL_INTERVAL);
        }

        let mut detached = 0;
        for handle in state.handles {
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::warn!("Scan worker panicked during shutdown");
                }
            } else {
                detached += 1;
            }
        }
        if detached > 0 {
            log::warn!(
                "{} scan workers still busy after {:?}; detaching them",
                detached,
                self.inner.config.stop_grace()
            );
        }

        self.inner.finish_batch(&state.tracker, true);
    }
}

impl EngineInner {
    fn scan_one(&self, path: &Path) -> ScanResult {
        let start = Instant::now();
        self.scan_stages(path).with_duration(start.elapsed())
    }

    fn scan_stages(&self, path: &Path) -> ScanResult {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ScanResult::error(path, format!("Path not found: {}", path.display()));
            }
            Err(e) => {
                return ScanResult::error(path, format!("Cannot read metadata: {}", e));
            }
        };
        if !metadata.is_file() {
            return ScanResult::error(path, "Not a regular file");
        }

        let size = metadata.len();
        let limit = self.config.max_file_size();
        if size > limit {
            log::trace!("Skipping large file: {:?} ({} bytes)", path, size);
            let reason = Error::FileTooLarge {
                path: path.to_path_buf(),
                size,
                limit,
            };
            return ScanResult::skipped(path, size, reason.to_string());
        }

        let digests = match DigestEngine::digest_all(path) {
            Ok(d) => d,
            Err(e) => return ScanResult::error(path, e.to_string()),
        };

        if let Some((algorithm, signature)) = self.db.lookup(&digests) {
            log::warn!(
                "Threat detected: {} in {:?} ({} match)",
                signature.name,
                path,
                algorithm
            );
            return ScanResult::threat(path, size, algorithm, signature);
        }

        let heuristic = match self.scorer.score_file(path, size) {
            Ok(h) => h,
            Err(e) => return ScanResult::error(path, e.to_string()),
        };
        if heuristic.suspicious {
            log::info!("Suspicious file: {:?} ({})", path, heuristic.summary());
            return ScanResult::suspicious(path, size, heuristic);
        }

        let analyzers: Vec<Arc<dyn ContainerAnalyzer>> = self
            .analyzers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.handles(path))
            .cloned()
            .collect();

        for analyzer in analyzers {
            match analyzer.analyze(path, &self.db) {
                Ok(Some(found)) => {
                    log::warn!(
                        "Threat detected: {} in {:?} (analyzer '{}'{})",
                        found.signature.name,
                        path,
                        analyzer.name(),
                        found
                            .entry
                            .as_deref()
                            .map(|e| format!(", entry {}", e))
                            .unwrap_or_default()
                    );
                    return ScanResult::container_threat(path, size, found);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Analyzer '{}' failed on {:?}: {}", analyzer.name(), path, e),
            }
        }

        ScanResult::clean(path, size).with_heuristic(heuristic)
    }

    fn run_worker(&self, queue: &Mutex<VecDeque<PathBuf>>, tracker: &BatchTracker) {
        loop {
            if tracker.cancelled.load(Ordering::SeqCst) {
                break;
            }

            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let Some(path) = next else {
                break;
            };

            let result = self.scan_one(&path);

            let last = {
                let _report = tracker.report.lock().unwrap_or_else(PoisonError::into_inner);
                // Batch already reported; drop late results.
                if tracker.fired.load(Ordering::SeqCst) {
                    log::debug!("Discarding late result for {:?}", path);
                    break;
                }

                self.stats.record(&result);
                tracker.stats.record(&result);
                if result.status.is_threat() {
                    self.listeners.emit(&ScanEvent::ThreatDetected(result.clone()));
                }
                self.listeners.emit(&ScanEvent::FileScanned(result));

                let snapshot = tracker.stats.snapshot();
                self.listeners.emit(&ScanEvent::Progress {
                    files_scanned: snapshot.files_scanned,
                    bytes_scanned: snapshot.bytes_scanned,
                });

                tracker.completed.fetch_add(1, Ordering::SeqCst) + 1 == tracker.total
            };

            if last {
                self.finish_batch(tracker, false);
            }
        }
    }

    /// Emit `Completed` for the batch. Only the first call has any effect.
    fn finish_batch(&self, tracker: &BatchTracker, cancelled: bool) {
        {
            let _report = tracker.report.lock().unwrap_or_else(PoisonError::into_inner);
            if tracker
                .fired
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
        }

        let summary = BatchSummary::new(
            tracker.id,
            tracker.total,
            tracker.stats.snapshot(),
            tracker.started.elapsed(),
            cancelled,
        );

        {
            let mut batch = self.batch.lock().unwrap_or_else(PoisonError::into_inner);
            if batch.as_ref().is_some_and(|b| b.tracker.id == tracker.id) {
                *batch = None;
            }
        }
        self.scanning.store(false, Ordering::SeqCst);

        log::info!(
            "Batch {} {}: {} files scanned, {} threats, {} suspicious, {} errors",
            summary.batch_id,
            if cancelled { "cancelled" } else { "completed" },
            summary.files_scanned,
            summary.threats_detected,
            summary.suspicious,
            summary.errors
        );
        self.listeners.emit(&ScanEvent::Completed(summary));
    }
}
