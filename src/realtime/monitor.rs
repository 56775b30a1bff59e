//! Realtime filesystem monitor feeding the scan engine.
//!
//! Every directory of the watched tree gets its own non-recursive watch, so
//! directories created or moved in later are picked up by re-walking them.
//! Qualifying file events pass through the cooldown cache and are scanned on
//! a background pool; only threats and suspicious files are reported.

use crate::core::config::RealtimeConfig;
use crate::core::error::{Error, Result};
use crate::realtime::cooldown::CooldownCache;
use crate::scanner::listener::{Listener, ListenerId, ListenerSet};
use crate::scanner::pool::WorkerPool;
use crate::scanner::result::ScanResult;
use crate::scanner::ScanEngine;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// How often the dispatcher checks whether monitoring was stopped.
const DISPATCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Events delivered to realtime listeners.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    MonitoringStarted(PathBuf),
    MonitoringStopped,
    /// A watched file scanned as a threat or suspicious.
    ThreatDetected(PathBuf, ScanResult),
    Error(String),
}

/// Filesystem activity that can trigger a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    MovedInto,
    WriteCompleted,
}

/// Map a raw watcher event to the activity it represents and the affected paths.
pub fn classify(event: &Event) -> Option<(WatchEventKind, Vec<PathBuf>)> {
    let kind = match event.kind {
        EventKind::Create(_) => WatchEventKind::Created,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            WatchEventKind::Modified
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::MovedInto,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // Paths are [from, to]; only the destination matters.
            return event
                .paths
                .last()
                .map(|to| (WatchEventKind::MovedInto, vec![to.clone()]));
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => WatchEventKind::WriteCompleted,
        _ => return None,
    };
    Some((kind, event.paths.clone()))
}

struct Session {
    root: PathBuf,
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
    running: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

struct MonitorInner {
    engine: ScanEngine,
    cooldown: CooldownCache,
    pool: WorkerPool,
    listeners: Arc<ListenerSet<RealtimeEvent>>,
    session: Mutex<Option<Session>>,
}

/// Watches one directory tree at a time.
pub struct RealtimeMonitor {
    inner: Arc<MonitorInner>,
}

impl RealtimeMonitor {
    pub fn new(engine: ScanEngine, config: &RealtimeConfig) -> Result<Self> {
        let pool = WorkerPool::new("veriscan-realtime", config.worker_threads)?;
        Ok(Self {
            inner: Arc::new(MonitorInner {
                engine,
                cooldown: CooldownCache::from_config(config),
                pool,
                listeners: Arc::new(ListenerSet::new()),
                session: Mutex::new(None),
            }),
        })
    }

    pub fn add_listener(&self, listener: impl Listener<RealtimeEvent> + 'static) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn subscribe(&self) -> Receiver<RealtimeEvent> {
        self.inner.listeners.subscribe()
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.lock_session().is_some()
    }

    pub fn watched_root(&self) -> Option<PathBuf> {
        self.inner.lock_session().as_ref().map(|s| s.root.clone())
    }

    /// Number of directories currently under watch.
    pub fn watched_directories(&self) -> usize {
        self.inner
            .lock_session()
            .as_ref()
            .map(|s| s.watched.len())
            .unwrap_or(0)
    }

    /// Begin watching `directory` and everything below it.
    pub fn start_monitoring(&self, directory: &Path) -> Result<()> {
        match self.inner.start(directory) {
            Ok(root) => {
                log::info!("Realtime monitoring started on {:?}", root);
                self.inner.listeners.emit(&RealtimeEvent::MonitoringStarted(root));
                Ok(())
            }
            Err(e) => {
                log::warn!("Cannot start monitoring {:?}: {}", directory, e);
                self.inner.listeners.emit(&RealtimeEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Remove every watch and clear the cooldown cache.
    ///
    /// Scans already handed to the pool still run and report.
    pub fn stop_monitoring(&self) {
        let session = self.inner.lock_session().take();
        let Some(mut session) = session else {
            return;
        };

        session.running.store(false, Ordering::SeqCst);
        if let Some(handle) = session.dispatcher.take() {
            if handle.join().is_err() {
                log::warn!("Monitor dispatcher panicked");
            }
        }
        let root = session.root.clone();
        drop(session);

        self.inner.cooldown.clear();
        log::info!("Realtime monitoring stopped on {:?}", root);
        self.inner.listeners.emit(&RealtimeEvent::MonitoringStopped);
    }
}

impl Drop for RealtimeMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

impl MonitorInner {
    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: &Arc<Self>, directory: &Path) -> Result<PathBuf> {
        if !directory.is_dir() {
            return Err(Error::invalid_monitor_target(directory));
        }
        let root = directory
            .canonicalize()
            .map_err(|_| Error::invalid_monitor_target(directory))?;

        let mut session_slot = self.lock_session();
        if let Some(existing) = session_slot.as_ref() {
            return Err(Error::AlreadyMonitoring(existing.root.clone()));
        }

        let (tx, rx) = mpsc::channel();
        let watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        let running = Arc::new(AtomicBool::new(true));
        let mut session = Session {
            root: root.clone(),
            watcher,
            watched: HashSet::new(),
            running: Arc::clone(&running),
            dispatcher: None,
        };

        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() {
                watch_dir(&mut session, entry.path())?;
            }
        }
        log::debug!("Installed {} directory watches under {:?}", session.watched.len(), root);

        let inner = Arc::clone(self);
        let dispatcher = thread::Builder::new()
            .name("veriscan-monitor".to_string())
            .spawn(move || inner.dispatch(&rx, &running))
            .map_err(|e| Error::Internal(format!("Failed to spawn monitor thread: {}", e)))?;
        session.dispatcher = Some(dispatcher);

        *session_slot = Some(session);
        Ok(root)
    }

    fn dispatch(&self, rx: &Receiver<notify::Result<Event>>, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            match rx.recv_timeout(DISPATCH_POLL_INTERVAL) {
                Ok(Ok(event)) => self.handle_event(&event),
                Ok(Err(e)) => {
                    log::warn!("Watch error: {}", e);
                    self.listeners.emit(&RealtimeEvent::Error(e.to_string()));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn handle_event(&self, event: &Event) {
        let Some((kind, paths)) = classify(event) else {
            return;
        };

        for path in paths {
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };

            if metadata.is_dir() {
                if matches!(kind, WatchEventKind::Created | WatchEventKind::MovedInto) {
                    self.watch_new_tree(&path);
                }
            } else if metadata.is_file() {
                log::trace!("{:?} event for {:?}", kind, path);
                self.submit(path);
            }
        }
    }

    /// Watch a directory that appeared after setup and submit files already in it.
    fn watch_new_tree(&self, dir: &Path) {
        let mut files = Vec::new();
        {
            let mut slot = self.lock_session();
            let Some(session) = slot.as_mut() else {
                return;
            };

            for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
                let file_type = entry.file_type();
                if file_type.is_dir() {
                    if let Err(e) = watch_dir(session, entry.path()) {
                        log::warn!("Failed to watch new directory {:?}: {}", entry.path(), e);
                    }
                } else if file_type.is_file() {
                    files.push(entry.into_path());
                }
            }
        }

        for file in files {
            self.submit(file);
        }
    }

    fn submit(&self, path: PathBuf) {
        if !self.cooldown.should_submit(&path, Instant::now()) {
            log::trace!("Debounced {:?}", path);
            return;
        }

        let engine = self.engine.clone();
        let listeners = Arc::clone(&self.listeners);
        let job = move || {
            let result = engine.scan_file(&path);
            if result.status.is_threat() {
                log::warn!("Realtime detection: {}", result);
                listeners.emit(&RealtimeEvent::ThreatDetected(path, result));
            }
        };

        if let Err(e) = self.pool.execute(job) {
            log::warn!("Dropped realtime scan: {}", e);
        }
    }
}

fn watch_dir(session: &mut Session, dir: &Path) -> Result<()> {
    if session.watched.contains(dir) {
        return Ok(());
    }
    session.watcher.watch(dir, RecursiveMode::NonRecursive)?;
    session.watched.insert(dir.to_path_buf());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::types::{DigestAlgorithm, ScanStatus, ThreatLevel};
    use crate::detection::{Signature, SignatureDatabase};
    use crate::utils::hash::DigestEngine;
    use notify::event::CreateKind;

    const MALWARE: &[u8] = b"realtime test payload";
    const WAIT: Duration = Duration::from_secs(10);

    fn monitor() -> RealtimeMonitor {
        let config = Config::default();
        let db = Arc::new(SignatureDatabase::with_capacity(1000, 0.01, 100));
        db.add_signature(
            Signature::new("Test.Realtime", "Test", ThreatLevel::High).with_digest(
                DigestAlgorithm::Sha1,
                DigestEngine::digest_bytes(MALWARE, DigestAlgorithm::Sha1),
            ),
        );
        let engine = ScanEngine::new(&config, db).unwrap();
        RealtimeMonitor::new(engine, &config.realtime).unwrap()
    }

    fn write_completed(path: &Path) -> Event {
        Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write))).add_path(path.to_path_buf())
    }

    fn next_threat(rx: &Receiver<RealtimeEvent>, timeout: Duration) -> Option<PathBuf> {
        let deadline = Instant::now() + timeout;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(RealtimeEvent::ThreatDetected(path, result)) => {
                    assert_eq!(result.status, ScanStatus::ThreatDetected);
                    return Some(path);
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    }

    #[test]
    fn test_classify_events() {
        let path = PathBuf::from("/tmp/x");
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        assert_eq!(classify(&created).unwrap().0, WatchEventKind::Created);

        let closed = write_completed(&path);
        assert_eq!(classify(&closed).unwrap().0, WatchEventKind::WriteCompleted);

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/tmp/old"))
            .add_path(path.clone());
        assert_eq!(
            classify(&renamed).unwrap(),
            (WatchEventKind::MovedInto, vec![path.clone()])
        );

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File)).add_path(path);
        assert!(classify(&removed).is_none());
    }

    #[test]
    fn test_invalid_target_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let monitor = monitor();
        let rx = monitor.subscribe();

        let err = monitor.start_monitoring(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::InvalidMonitorTarget(_)));
        assert!(monitor.start_monitoring(&file).is_err());
        assert!(!monitor.is_monitoring());
        assert!(matches!(rx.try_recv(), Ok(RealtimeEvent::Error(_))));
    }

    #[test]
    fn test_burst_yields_one_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropper.bin");
        std::fs::write(&path, MALWARE).unwrap();

        let monitor = monitor();
        let rx = monitor.subscribe();

        monitor.inner.handle_event(&write_completed(&path));
        monitor.inner.handle_event(&write_completed(&path));

        assert_eq!(next_threat(&rx, WAIT), Some(path));
        assert_eq!(next_threat(&rx, Duration::from_millis(500)), None);
    }

    #[test]
    fn test_clean_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, vec![b'n'; 500]).unwrap();

        let monitor = monitor();
        let rx = monitor.subscribe();
        monitor.inner.handle_event(&write_completed(&path));

        assert_eq!(next_threat(&rx, Duration::from_millis(500)), None);
    }

    #[test]
    fn test_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a").join("b")).unwrap();

        let monitor = monitor();
        let rx = monitor.subscribe();
        monitor.start_monitoring(dir.path()).unwrap();
        assert!(monitor.is_monitoring());
        assert_eq!(monitor.watched_directories(), 3);
        assert!(matches!(
            monitor.start_monitoring(dir.path()),
            Err(Error::AlreadyMonitoring(_))
        ));

        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
        assert!(monitor.inner.cooldown.is_empty());

        let events: Vec<RealtimeEvent> = rx.try_iter().collect();
        assert!(matches!(events.first(), Some(RealtimeEvent::MonitoringStarted(_))));
        assert!(matches!(events.last(), Some(RealtimeEvent::MonitoringStopped)));
    }

    #[test]
    fn test_new_directory_is_walked() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor();
        let rx = monitor.subscribe();
        monitor.start_monitoring(dir.path()).unwrap();

        // Build the tree elsewhere so it appears complete in one move.
        let staging = tempfile::tempdir().unwrap();
        let nested = staging.path().join("incoming").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("payload.bin"), MALWARE).unwrap();

        let root = monitor.watched_root().unwrap();
        let incoming = root.join("incoming");
        std::fs::rename(staging.path().join("incoming"), &incoming).unwrap();

        let moved = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(incoming.clone());
        monitor.inner.handle_event(&moved);

        let payload = incoming.join("deep").join("payload.bin");
        assert_eq!(next_threat(&rx, WAIT), Some(payload));
        assert!(monitor.watched_directories() >= 3);
        monitor.stop_monitoring();
    }

    #[test]
    fn test_detects_file_moved_into_watched_dir() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor();
        let rx = monitor.subscribe();
        monitor.start_monitoring(dir.path()).unwrap();

        let staging = tempfile::tempdir().unwrap();
        let staged = staging.path().join("fresh.bin");
        std::fs::write(&staged, MALWARE).unwrap();

        let path = monitor.watched_root().unwrap().join("fresh.bin");
        std::fs::rename(&staged, &path).unwrap();

        assert_eq!(next_threat(&rx, WAIT), Some(path));
        monitor.stop_monitoring();
    }
}
