//! Realtime filesystem monitoring.
//!
//! Filesystem events are debounced per path and the affected files are
//! scanned in the background.

pub mod cooldown;
pub mod monitor;

pub use cooldown::CooldownCache;
pub use monitor::{RealtimeEvent, RealtimeMonitor, WatchEventKind};
