use std::time::Duration;

use tokio::time::{sleep_until, Instant};

struct Entry {
    index: usize,
    interval: Duration,
    next: Instant,
}

/// Fires each sensor's store trigger at its own interval.
///
/// The first firing of each entry is one interval after it was added.
#[derive(Default)]
pub struct StoreSchedule {
    entries: Vec<Entry>,
}

impl StoreSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero intervals are rejected by configuration validation.
    pub fn add(&mut self, index: usize, interval: Duration) {
        debug_assert!(!interval.is_zero());
        self.entries.push(Entry { index, interval, next: Instant::now() + interval });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wait for the next due entry and return its sensor index.
    ///
    /// Entries due at the same instant fire in insertion order. Returns
    /// `None` when nothing is scheduled.
    pub async fn next(&mut self) -> Option<usize> {
        let entry = self.entries.iter_mut().min_by_key(|e| e.next)?;
        sleep_until(entry.next).await;
        entry.next += entry.interval;
        Some(entry.index)
    }
}
