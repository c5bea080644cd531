//! A directory entry: one filter plus its access bookkeeping.

use crate::error::{Error, Result};
use crate::filter::{FilterState, ScalableFilter};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One filter in the manager's directory.
///
/// `last_access` is stored as milliseconds since the manager's epoch plus one,
/// so that 0 can mean "never accessed".
#[derive(Debug)]
pub(crate) struct FilterEntry {
    filter: RwLock<ScalableFilter>,
    hot: AtomicBool,
    last_access: AtomicU64,
    detached: AtomicBool,
}

impl FilterEntry {
    pub(crate) fn new(filter: ScalableFilter) -> Self {
        Self {
            filter: RwLock::new(filter),
            hot: AtomicBool::new(false),
            last_access: AtomicU64::new(0),
            detached: AtomicBool::new(false),
        }
    }

    /// Marks the entry as removed from the directory.
    ///
    /// Operations already holding the lock finish normally. Callers that
    /// resolved the entry earlier observe `NotFound` once they get the lock.
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Shared access to a live filter.
    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, ScalableFilter>> {
        let guard = self.filter.read();
        self.check_live(&guard)?;
        Ok(guard)
    }

    /// Exclusive access to a live filter.
    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, ScalableFilter>> {
        let guard = self.filter.write();
        self.check_live(&guard)?;
        Ok(guard)
    }

    /// Shared access to a live filter whose pages are all resident.
    ///
    /// Re-maps under the write lock when needed, then downgrades so that
    /// concurrent readers are only blocked for the page-in itself.
    pub(crate) fn read_resident(&self) -> Result<RwLockReadGuard<'_, ScalableFilter>> {
        let guard = self.read()?;
        if guard.is_resident() {
            return Ok(guard);
        }
        drop(guard);

        let mut guard = self.write()?;
        guard.ensure_resident()?;
        Ok(RwLockWriteGuard::downgrade(guard))
    }

    fn check_live(&self, filter: &ScalableFilter) -> Result<()> {
        if self.is_detached() || filter.state() == FilterState::Deleted {
            return Err(Error::not_found(filter.name()));
        }
        Ok(())
    }

    /// Exclusive access ignoring the state, for teardown and deletion.
    pub(crate) fn lock_any(&self) -> RwLockWriteGuard<'_, ScalableFilter> {
        self.filter.write()
    }

    /// Records an access at `now` and marks the filter hot.
    pub(crate) fn touch(&self, now: Duration) {
        let stamp = now.as_millis() as u64 + 1;
        self.last_access.fetch_max(stamp, Ordering::Relaxed);
        self.hot.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_hot(&self) -> bool {
        self.hot.load(Ordering::Relaxed)
    }

    /// Marks the filter cold if it is hot and was last accessed at least
    /// `cold_interval` before `now`. Returns true if it was cooled.
    pub(crate) fn cool_if_idle(&self, now: Duration, cold_interval: Duration) -> bool {
        if !self.is_hot() {
            return false;
        }
        let Some(last) = self.last_access() else {
            return false;
        };
        if now.saturating_sub(last) < cold_interval {
            return false;
        }
        self.hot
            .compare_exchange(true, false, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Time of the last access relative to the manager epoch.
    pub(crate) fn last_access(&self) -> Option<Duration> {
        match self.last_access.load(Ordering::Relaxed) {
            0 => None,
            stamp => Some(Duration::from_millis(stamp - 1)),
        }
    }
}

/// Monotonic clock anchored at manager creation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Epoch(Instant);

impl Epoch {
    pub(crate) fn now() -> Self {
        Epoch(Instant::now())
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}
