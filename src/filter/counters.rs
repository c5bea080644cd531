//! Per-filter operation counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of a filter.
///
/// Counters are atomics so that checks running under a shared lock can
/// still record hits and misses.
#[derive(Debug, Default)]
pub struct FilterCounters {
    check_hits: AtomicU64,
    check_misses: AtomicU64,
    set_hits: AtomicU64,
    set_misses: AtomicU64,
    page_ins: AtomicU64,
    page_outs: AtomicU64,
}

impl FilterCounters {
    pub(crate) fn record_check(&self, hit: bool) {
        let counter = if hit { &self.check_hits } else { &self.check_misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// `added` is true when the key was newly inserted.
    pub(crate) fn record_set(&self, added: bool) {
        let counter = if added { &self.set_hits } else { &self.set_misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_page_ins(&self, pages: u64) {
        self.page_ins.fetch_add(pages, Ordering::Relaxed);
    }

    pub(crate) fn add_page_outs(&self, pages: u64) {
        self.page_outs.fetch_add(pages, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            check_hits: self.check_hits.load(Ordering::Relaxed),
            check_misses: self.check_misses.load(Ordering::Relaxed),
            set_hits: self.set_hits.load(Ordering::Relaxed),
            set_misses: self.set_misses.load(Ordering::Relaxed),
            page_ins: self.page_ins.load(Ordering::Relaxed),
            page_outs: self.page_outs.load(Ordering::Relaxed),
        }
    }
}

/// A copy of a filter's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Checks that found the key.
    pub check_hits: u64,
    /// Checks that did not find the key.
    pub check_misses: u64,
    /// Sets that inserted a new key.
    pub set_hits: u64,
    /// Sets of a key that was already present.
    pub set_misses: u64,
    /// Pages read in from the backend.
    pub page_ins: u64,
    /// Pages released to the backend.
    pub page_outs: u64,
}

impl CounterSnapshot {
    /// Total number of checks.
    pub fn checks(&self) -> u64 {
        self.check_hits + self.check_misses
    }

    /// Total number of sets.
    pub fn sets(&self) -> u64 {
        self.set_hits + self.set_misses
    }
}
