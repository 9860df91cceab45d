//! Bounded, time-ordered history of book states.
//!
//! Entries are appended in processing order, so timestamps are already
//! non-decreasing and the buffer never re-sorts. Lookups are a binary search
//! over the retained window.

use std::collections::VecDeque;

use tracing::trace;

use crate::types::{BookState, TimestampMs};

/// One retained book state.
///
/// `timestamp` is the ordering key used for lookups. It equals
/// `state.timestamp` unless the producer's clock stepped backwards, in which
/// case it is clamped to the previous entry's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Lookup key
    pub timestamp: TimestampMs,
    /// Owned copy of the book at that instant
    pub state: BookState,
}

/// Capacity-bounded replay history.
///
/// Evicts oldest-first once `capacity` is exceeded.
///
/// # Thread Safety
///
/// This struct is `Send + Sync` but not internally synchronized. The engine
/// wraps it in `parking_lot::RwLock` so ingestion (single writer) and
/// presentation (readers) can share it.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Create an empty buffer retaining at most `capacity` entries
    ///
    /// A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Get the capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a state, evicting the oldest entries beyond capacity
    pub fn add(&mut self, state: BookState) {
        let timestamp = match self.entries.back() {
            Some(last) if state.timestamp < last.timestamp => {
                trace!(
                    state_ts = state.timestamp,
                    last_ts = last.timestamp,
                    "Clock stepped backwards, clamping history key"
                );
                last.timestamp
            }
            _ => state.timestamp,
        };

        self.entries.push_back(HistoryEntry { timestamp, state });

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Find the entry with the greatest timestamp `<= timestamp`.
    ///
    /// Returns `None` when the buffer is empty or when every retained entry
    /// is newer than the query.
    #[must_use]
    pub fn get_nearest(&self, timestamp: TimestampMs) -> Option<&HistoryEntry> {
        // Number of entries with key <= timestamp; the last of them is the answer.
        let idx = self.entries.partition_point(|e| e.timestamp <= timestamp);
        idx.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Read-only view of every retained entry, oldest first
    pub fn get_range(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> + DoubleEndedIterator + '_ {
        self.entries.iter()
    }

    /// Oldest retained entry
    #[must_use]
    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// Newest retained entry
    #[must_use]
    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Earliest and latest retained timestamps
    #[must_use]
    pub fn bounds(&self) -> Option<(TimestampMs, TimestampMs)> {
        match (self.entries.front(), self.entries.back()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the buffer holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_HISTORY_CAPACITY)
    }
}
