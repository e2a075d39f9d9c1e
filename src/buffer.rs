//! Bounded in-memory buffer for captured log entries.
//!
//! All mutation goes through one mutex. The lock is only held while entries
//! are moved in or out of the queue, never while a batch is being delivered,
//! so a slow sink cannot stall producers.
//!
//! # Overflow policy
//!
//! When the buffer is at its ceiling, appending evicts the single oldest
//! entry first (sliding window). Producers are never blocked or refused.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::entry::LogEntry;

/// Counters kept alongside the buffered entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Total number of entries appended by producers
    pub entries_received: u64,

    /// Entries dropped by the overflow policy
    pub entries_evicted: u64,

    /// Entries put back after a failed send
    pub entries_requeued: u64,
}

struct Inner {
    entries: VecDeque<LogEntry>,
    stats: BufferStats,
    /// Set after an eviction until the next swap-out, so overflow is reported once.
    overflowing: bool,
}

/// Lock-protected FIFO with a hard capacity ceiling.
pub struct BoundedBuffer {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl BoundedBuffer {
    /// Create a buffer that never holds more than `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        let max_entries = if max_entries == 0 {
            warn!("max buffer entries is 0, using 1");
            1
        } else {
            max_entries
        };

        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(max_entries.min(10_000)),
                stats: BufferStats::default(),
                overflowing: false,
            }),
            max_entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A producer that panicked mid-append cannot leave the queue half-moved.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry, evicting the oldest one when the buffer is full.
    ///
    /// Returns `true` if an entry was evicted to make room.
    pub fn append(&self, entry: LogEntry) -> bool {
        let mut report = None;
        let evicted = {
            let mut inner = self.lock();
            inner.stats.entries_received += 1;

            let evicted = inner.entries.len() >= self.max_entries;
            if evicted {
                inner.entries.pop_front();
                inner.stats.entries_evicted += 1;
                if !inner.overflowing {
                    inner.overflowing = true;
                    report = Some(inner.stats.entries_evicted);
                }
            }

            inner.entries.push_back(entry);
            evicted
        };

        if let Some(total_evicted) = report {
            warn!(
                max_entries = self.max_entries,
                total_evicted = total_evicted,
                "Buffer full: evicting oldest entries"
            );
        }

        evicted
    }

    /// Atomically remove and return everything currently buffered.
    pub fn swap_out(&self) -> Vec<LogEntry> {
        let taken = {
            let mut inner = self.lock();
            inner.overflowing = false;
            std::mem::take(&mut inner.entries)
        };
        Vec::from(taken)
    }

    /// Put a failed batch back in front of anything appended since it was taken.
    ///
    /// If the merged sequence would exceed the ceiling, the oldest entries are
    /// evicted, starting from the front of the requeued batch.
    pub fn requeue(&self, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }

        let mut inner = self.lock();
        let overflow = (entries.len() + inner.entries.len()).saturating_sub(self.max_entries);
        inner.stats.entries_requeued += (entries.len() - overflow) as u64;
        inner.stats.entries_evicted += overflow as u64;

        let mut merged: VecDeque<LogEntry> = entries.into_iter().skip(overflow).collect();
        merged.append(&mut inner.entries);
        inner.entries = merged;
    }

    /// Current number of buffered entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// The eviction threshold.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> BufferStats {
        self.lock().stats
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }
}
