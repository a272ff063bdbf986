//! Time sources.
//!
//! Code crash if there is a physical inconsistency (unrecoverable state).

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current time, in seconds since Unix epoch.
pub trait Clock: Send + Sync {
    /// Get the current Unix timestamp in seconds.
    fn now(&self) -> u64;
}

/// System clock using the OS time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_secs()
    }
}

/// Manually driven clock.
#[derive(Debug, Default)]
pub struct FixedClock {
    timestamp: AtomicU64,
}

impl FixedClock {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp: AtomicU64::new(timestamp),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, seconds: u64) {
        self.timestamp.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }
}
