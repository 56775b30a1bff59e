//! Event fan-out to registered listeners.
//!
//! Listeners may be called concurrently from worker threads. Events reach
//! each listener in the order they were emitted by a given thread.

use crate::scanner::progress::BatchSummary;
use crate::scanner::result::ScanResult;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

/// Events emitted by the scan engine.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A batch was accepted.
    Started { batch_id: Uuid, total_files: usize },
    /// One more file of the current batch finished.
    Progress { files_scanned: u64, bytes_scanned: u64 },
    /// Terminal result of one batch file.
    FileScanned(ScanResult),
    /// A file was found to be a threat or suspicious.
    ThreatDetected(ScanResult),
    /// The batch finished or was stopped; fires once per batch.
    Completed(BatchSummary),
    /// A request was rejected.
    Error(String),
}

/// Receives events of type `E`.
pub trait Listener<E>: Send + Sync {
    fn on_event(&self, event: &E);

    /// A closed listener is dropped from the set after the next emit.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<E, F> Listener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

/// Handle returned on registration, used to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Forwards events into an mpsc channel.
struct ChannelListener<E> {
    sender: Mutex<Sender<E>>,
    closed: AtomicBool,
}

impl<E: Clone + Send> Listener<E> for ChannelListener<E> {
    fn on_event(&self, event: &E) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.send(event.clone()).is_err() {
            self.closed.store(true, Ordering::Relaxed);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// Registered listeners for one event type.
pub struct ListenerSet<E> {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn Listener<E>>)>>,
    next_id: AtomicU64,
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E: 'static> ListenerSet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: impl Listener<E> + 'static) -> ListenerId {
        self.add_arc(Arc::new(listener))
    }

    pub fn add_arc(&self, listener: Arc<dyn Listener<E>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Detach a listener. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Register a channel subscriber.
    pub fn subscribe(&self) -> Receiver<E>
    where
        E: Clone + Send,
    {
        let (tx, rx) = mpsc::channel();
        self.add(ChannelListener {
            sender: Mutex::new(tx),
            closed: AtomicBool::new(false),
        });
        rx
    }

    /// Deliver an event to every listener.
    ///
    /// The list is snapshotted first, so listeners may add or remove
    /// listeners from inside a callback.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Arc<dyn Listener<E>>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        let mut saw_closed = false;
        for listener in &snapshot {
            listener.on_event(event);
            saw_closed |= listener.is_closed();
        }

        if saw_closed {
            self.listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(_, l)| !l.is_closed());
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_closure_listener() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let total = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&total);
        set.add(move |n: &u32| {
            t.fetch_add(*n as usize, Ordering::SeqCst);
        });

        set.emit(&2);
        set.emit(&3);
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_remove_listener() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = set.add(move |_: &u32| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        set.emit(&1);
        assert!(set.remove(id));
        assert!(!set.remove(id));
        set.emit(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_preserves_order() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let rx = set.subscribe();
        for i in 0..10 {
            set.emit(&i);
        }
        let received: Vec<u32> = rx.try_iter().collect();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let rx = set.subscribe();
        assert_eq!(set.len(), 1);
        drop(rx);

        set.emit(&1);
        assert!(set.is_empty());
    }
}
