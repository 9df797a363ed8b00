//! Allocation tracking context
//!
//! An [`AllocContext`] is handed to the pipeline at startup and threaded
//! into every growable buffer. It does not allocate anything itself; it
//! records when and by how much buffer storage grows so a host can watch
//! steady-state behaviour (no growth after warm-up).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    grow_events: AtomicU64,
    bytes_reserved: AtomicU64,
}

/// Cloneable handle to shared allocation counters.
#[derive(Debug, Clone, Default)]
pub struct AllocContext {
    counters: Arc<Counters>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Number of capacity doublings across all buffers
    pub grow_events: u64,
    /// Total bytes reserved by those doublings
    pub bytes_reserved: u64,
}

impl AllocContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a buffer growing by `bytes`.
    pub fn record_growth(
        &self,
        label: &'static str,
        old_capacity: usize,
        new_capacity: usize,
        bytes: usize,
    ) {
        self.counters.grow_events.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_reserved
            .fetch_add(bytes as u64, Ordering::Relaxed);
        tracing::trace!(
            "{} grew {} -> {} ({} bytes)",
            label,
            old_capacity,
            new_capacity,
            bytes
        );
    }

    pub fn stats(&self) -> AllocStats {
        AllocStats {
            grow_events: self.counters.grow_events.load(Ordering::Relaxed),
            bytes_reserved: self.counters.bytes_reserved.load(Ordering::Relaxed),
        }
    }
}
