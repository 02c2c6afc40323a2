use std::sync::atomic::{AtomicU64, Ordering};

/// Number of new and updated incidents surfaced since startup, across all providers.
///
/// Owned by the tracker and shared with every poll loop and the health
/// endpoint through an `Arc`.
#[derive(Debug, Default)]
pub struct IncidentCounter(AtomicU64);

impl IncidentCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one and returns the new total.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
