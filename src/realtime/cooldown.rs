//! Per-path debounce for filesystem events.

use crate::core::config::RealtimeConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Remembers when each path was last submitted for scanning.
///
/// The timestamp is written as soon as a submission is accepted, so a burst
/// of events arriving while the scan is still running is dropped.
#[derive(Debug)]
pub struct CooldownCache {
    window: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<PathBuf, Instant>>,
}

impl CooldownCache {
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            window,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.cooldown(), config.max_tracked_paths)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a submission for `path` at `now` unless one happened within
    /// the window. Returns whether the caller should scan.
    pub fn should_submit(&self, path: &Path, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = entries.get(path) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        } else if entries.len() >= self.max_entries {
            self.make_room(&mut entries, now);
        }

        entries.insert(path.to_path_buf(), now);
        true
    }

    /// Drop expired entries, then the oldest ones if still at capacity.
    fn make_room(&self, entries: &mut HashMap<PathBuf, Instant>, now: Instant) {
        entries.retain(|_, last| now.saturating_duration_since(*last) < self.window);
        if entries.len() < self.max_entries {
            return;
        }

        let excess = entries.len() + 1 - self.max_entries;
        let mut by_age: Vec<(PathBuf, Instant)> =
            entries.iter().map(|(p, t)| (p.clone(), *t)).collect();
        by_age.sort_by_key(|(_, t)| *t);
        for (path, _) in by_age.into_iter().take(excess) {
            entries.remove(&path);
        }
        log::debug!("Cooldown cache full; evicted {} oldest entries", excess);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> CooldownCache {
        CooldownCache::new(Duration::from_millis(2000), 100)
    }

    #[test]
    fn test_events_inside_window_are_debounced() {
        let cache = cache();
        let path = Path::new("/watched/report.docx");
        let t0 = Instant::now();

        assert!(cache.should_submit(path, t0));
        assert!(!cache.should_submit(path, t0 + Duration::from_millis(500)));
        assert!(cache.should_submit(path, t0 + Duration::from_millis(2100)));
    }

    #[test]
    fn test_paths_are_independent() {
        let cache = cache();
        let t0 = Instant::now();
        assert!(cache.should_submit(Path::new("/a"), t0));
        assert!(cache.should_submit(Path::new("/b"), t0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_expired_entries_swept_at_capacity() {
        let cache = CooldownCache::new(Duration::from_millis(100), 2);
        let t0 = Instant::now();
        assert!(cache.should_submit(Path::new("/a"), t0));
        assert!(cache.should_submit(Path::new("/b"), t0));

        let later = t0 + Duration::from_millis(500);
        assert!(cache.should_submit(Path::new("/c"), later));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oldest_evicted_when_all_fresh() {
        let cache = CooldownCache::new(Duration::from_secs(60), 2);
        let t0 = Instant::now();
        assert!(cache.should_submit(Path::new("/old"), t0));
        assert!(cache.should_submit(Path::new("/new"), t0 + Duration::from_millis(10)));
        assert!(cache.should_submit(Path::new("/newest"), t0 + Duration::from_millis(20)));

        assert_eq!(cache.len(), 2);
        // "/old" was evicted, so it is accepted again; "/new" is still cooling down.
        assert!(!cache.should_submit(Path::new("/new"), t0 + Duration::from_millis(30)));
        assert!(cache.should_submit(Path::new("/old"), t0 + Duration::from_millis(30)));
    }

    #[test]
    fn test_clear() {
        let cache = cache();
        let t0 = Instant::now();
        cache.should_submit(Path::new("/a"), t0);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.should_submit(Path::new("/a"), t0));
    }
}
