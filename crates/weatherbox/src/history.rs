use heapless::HistoryBuffer;

/// Readings kept per sensor.
pub const HISTORY_CAPACITY: usize = 20;

/// Fixed-capacity ring of the most recent readings, oldest evicted first.
pub struct History<T> {
    buf: HistoryBuffer<T, HISTORY_CAPACITY>,
    pushed: u64,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> History<T> {
    pub const fn new() -> Self {
        Self { buf: HistoryBuffer::new(), pushed: 0 }
    }

    pub fn push(&mut self, item: T) {
        self.buf.write(item);
        self.pushed += 1;
    }

    /// The most recently pushed entry.
    pub fn latest(&self) -> Option<&T> {
        self.buf.recent()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.oldest_ordered()
    }

    /// Entries from newest to oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> {
        self.iter().collect::<Vec<_>>().into_iter().rev()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    /// Entries pushed over the buffer's lifetime, including evicted ones.
    pub fn total_pushed(&self) -> u64 {
        self.pushed
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for History<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
