//! The filter manager: a concurrent, name-addressed directory of filters.
//!
//! ## Locking
//!
//! - The directory is a lock-free skip list; lookups never block.
//! - Name-space changes (`create`, `drop`, `clear`) are serialized by one
//!   mutex that lookups never take. It is never held across backend I/O or
//!   while waiting for a filter lock.
//! - Each filter has its own read/write lock. Checks share it, every other
//!   operation takes it exclusively. Page I/O only ever happens under a
//!   filter lock, never under a directory-wide one.
//!
//! Dropping a filter detaches its entry, then waits for the filter's write
//! lock before deleting its storage. The detached entry keeps the name taken
//! until the storage is gone. Operations that resolved the filter earlier
//! find it detached once they get the lock and fail with [`Error::NotFound`].
//! A new filter reserves its name with a locked placeholder entry and is
//! materialized after the namespace lock is released.

mod entry;
mod worker;

pub use worker::MaintenanceWorker;

use crate::backend::{Backend, FileBackend};
use crate::config::{validate_filter_name, Config, FilterConfig};
use crate::error::{Error, Result};
use crate::filter::{AddOutcome, FilterInfo, FilterState, ScalableFilter};
use crossbeam_skiplist::SkipMap;
use entry::{Epoch, FilterEntry};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Name-addressed access to a set of scalable filters.
///
/// `FilterManager` is thread-safe; share it with `Arc<FilterManager>`.
///
/// # Example
///
/// ```rust,no_run
/// use bloomstore::{Config, FilterManager};
///
/// # fn main() -> Result<(), bloomstore::Error> {
/// let manager = FilterManager::open(Config::default().data_dir("/tmp/bloomstore"))?;
/// manager.create_filter("users", None)?;
///
/// assert_eq!(manager.set_keys("users", &["alice", "bob"])?, vec![true, true]);
/// assert_eq!(manager.check_keys("users", &["alice", "carol"])?, vec![true, false]);
/// # Ok(())
/// # }
/// ```
pub struct FilterManager {
    config: Config,
    backend: Option<Arc<dyn Backend>>,
    filters: SkipMap<String, Arc<FilterEntry>>,
    /// Names cleared since open, whose data a create re-attaches. The lock
    /// serializes every change to the directory and is never held over I/O.
    cleared: Mutex<HashSet<String>>,
    epoch: Epoch,
}

impl FilterManager {
    /// Opens a manager persisting filters below `config.data_dir`.
    ///
    /// Every filter already stored there is registered as PROXIED. A filter
    /// whose state cannot be read is still registered and reports its error
    /// when first accessed.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let backend = FileBackend::open(&config.data_dir)?;
        Self::with_backend(config, Some(Arc::new(backend)))
    }

    /// Creates a manager over an arbitrary backend.
    ///
    /// Without a backend every filter is kept in memory.
    pub fn with_backend(config: Config, backend: Option<Arc<dyn Backend>>) -> Result<Self> {
        config.validate()?;
        let manager = Self {
            config,
            backend,
            filters: SkipMap::new(),
            cleared: Mutex::new(HashSet::new()),
            epoch: Epoch::now(),
        };
        manager.discover()?;
        Ok(manager)
    }

    fn discover(&self) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        // Discovered filters are persistent by definition.
        let fallback = self.config.filter_config().in_memory(false);
        let mut found = 0;
        for name in backend.discover()? {
            if let Err(e) = validate_filter_name(&name) {
                log::warn!("Skipping filter directory with invalid name: {}", e);
                continue;
            }
            let filter = match ScalableFilter::discover(name.as_str(), backend.clone(), fallback) {
                Ok(filter) => filter,
                Err(e) => {
                    log::warn!("Failed to read state of filter {}: {}", name, e);
                    ScalableFilter::proxied(name.as_str(), fallback, Some(backend.clone()))
                }
            };
            self.filters.insert(name, Arc::new(FilterEntry::new(filter)));
            found += 1;
        }

        if found > 0 {
            log::info!("Discovered {} filters", found);
        }
        Ok(())
    }

    /// The manager configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The persistence backend, if any.
    pub fn backend(&self) -> Option<&Arc<dyn Backend>> {
        self.backend.as_ref()
    }

    /// Number of filters in the directory.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns true if the directory holds no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns true if a filter named `name` is present.
    pub fn contains_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    fn entry(&self, name: &str) -> Result<Arc<FilterEntry>> {
        self.filters
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::not_found(name))
    }

    /// Creates a new filter.
    ///
    /// Uses `custom` if given, else the configuration derived from the
    /// manager defaults. The configuration is validated before any storage
    /// is touched. Fails with [`Error::AlreadyExists`] if the name is
    /// present in any state, PROXIED included.
    ///
    /// Data left under `name` by a failed drop is discarded; only data of a
    /// filter removed with [`clear_filter`](Self::clear_filter) is
    /// re-attached.
    pub fn create_filter(&self, name: &str, custom: Option<FilterConfig>) -> Result<()> {
        validate_filter_name(name)?;
        let config = custom.unwrap_or_else(|| self.config.filter_config());
        config.validate()?;

        // The placeholder stays locked until the filter is materialized, so
        // the name is reserved without holding the namespace lock over I/O.
        let entry = Arc::new(FilterEntry::new(ScalableFilter::proxied(name, config, self.backend.clone())));
        let mut slot = entry.lock_any();
        let reattach = {
            let mut cleared = self.cleared.lock();
            if self.filters.contains_key(name) {
                return Err(Error::already_exists(name));
            }
            self.filters.insert(name.to_string(), entry.clone());
            cleared.remove(name)
        };

        match self.materialize(name, config, reattach) {
            Ok(filter) => *slot = filter,
            Err(e) => {
                let mut cleared = self.cleared.lock();
                // A concurrent drop that detached the placeholder unlinks it.
                if !entry.is_detached() {
                    entry.detach();
                    self.unlink(name, &entry);
                    if reattach {
                        cleared.insert(name.to_string());
                    }
                }
                return Err(e);
            }
        }
        drop(slot);

        log::info!("Created filter {}", name);
        Ok(())
    }

    fn materialize(&self, name: &str, config: FilterConfig, reattach: bool) -> Result<ScalableFilter> {
        if let (false, Some(backend)) = (reattach, &self.backend) {
            if backend.read_existing(name)?.is_some() {
                log::warn!("Discarding leftover data of filter {}", name);
                backend.remove(name)?;
            }
        }
        ScalableFilter::create(name, config, self.backend.clone())
    }

    /// Removes `entry` from the directory if it is still registered under
    /// `name`. Call with the namespace lock held.
    fn unlink(&self, name: &str, entry: &Arc<FilterEntry>) {
        if let Some(current) = self.filters.get(name) {
            if Arc::ptr_eq(current.value(), entry) {
                current.remove();
            }
        }
    }

    /// Removes a filter and deletes all of its persisted state.
    ///
    /// Waits for in-flight operations on the filter. The name stays taken
    /// until deletion finishes and is free once this returns, even if
    /// deletion failed.
    pub fn drop_filter(&self, name: &str) -> Result<()> {
        let entry = {
            let _cleared = self.cleared.lock();
            let entry = self.entry(name)?;
            if entry.is_detached() {
                return Err(Error::not_found(name));
            }
            entry.detach();
            entry
        };

        let result = entry.lock_any().delete();
        {
            let _cleared = self.cleared.lock();
            self.unlink(name, &entry);
        }
        result?;

        log::info!("Dropped filter {}", name);
        Ok(())
    }

    /// Removes a filter from the directory without deleting its data.
    ///
    /// Only a PROXIED or UNMAPPED filter can be cleared. A later
    /// [`create_filter`](Self::create_filter) of the same name re-attaches
    /// the persisted data.
    pub fn clear_filter(&self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        let filter = entry.write()?;
        match filter.state() {
            FilterState::Proxied | FilterState::Unmapped => {}
            state => {
                return Err(Error::invalid_state(format!(
                    "filter {} is {}; only proxied or unmapped filters can be cleared",
                    name, state
                )));
            }
        }

        {
            let mut cleared = self.cleared.lock();
            if entry.is_detached() {
                return Err(Error::not_found(name));
            }
            entry.detach();
            self.unlink(name, &entry);
            cleared.insert(name.to_string());
        }
        drop(filter);

        log::info!("Cleared filter {}", name);
        Ok(())
    }

    /// Describes every present filter, ordered by name.
    pub fn list_filters(&self) -> Vec<FilterInfo> {
        self.collect_info(|_| true)
    }

    /// Describes every present filter that is cold.
    ///
    /// A filter is cold until it is accessed through
    /// [`set_keys`](Self::set_keys) or [`check_keys`](Self::check_keys), and
    /// again once a cold sweep finds it idle for `cold_interval_secs`.
    pub fn list_cold_filters(&self) -> Vec<FilterInfo> {
        self.collect_info(|entry| !entry.is_hot())
    }

    fn collect_info(&self, include: impl Fn(&FilterEntry) -> bool) -> Vec<FilterInfo> {
        self.filters
            .iter()
            .filter(|e| include(e.value()))
            .filter_map(|e| e.value().read().ok().map(|filter| filter.info()))
            .collect()
    }

    /// Marks every hot filter idle for at least `cold_interval_secs` as cold.
    ///
    /// Returns the number of filters that were cooled. Cooling is pure
    /// bookkeeping; no memory is released.
    pub fn sweep_cold(&self) -> usize {
        let now = self.epoch.elapsed();
        let cold_interval = self.config.cold_interval();
        self.filters.iter().filter(|e| e.value().cool_if_idle(now, cold_interval)).count()
    }

    /// Adds `keys` to the filter `name`.
    ///
    /// Returns, per key, whether it was newly inserted. Pages the filter in
    /// first if needed and marks it hot.
    ///
    /// Keys are added in order. If adding one fails, the keys before it stay
    /// added and only the error is returned; re-sending the batch is safe.
    pub fn set_keys<K: AsRef<[u8]>>(&self, name: &str, keys: &[K]) -> Result<Vec<bool>> {
        let entry = self.entry(name)?;
        let mut filter = entry.write()?;
        filter.ensure_resident()?;
        entry.touch(self.epoch.elapsed());

        keys.iter()
            .map(|key| filter.add(key.as_ref()).map(AddOutcome::is_added))
            .collect()
    }

    /// Checks `keys` against the filter `name`.
    ///
    /// Returns, per key, whether it is present. Pages the filter in first if
    /// needed and marks it hot.
    pub fn check_keys<K: AsRef<[u8]>>(&self, name: &str, keys: &[K]) -> Result<Vec<bool>> {
        let entry = self.entry(name)?;
        let filter = entry.read_resident()?;
        entry.touch(self.epoch.elapsed());

        keys.iter()
            .map(|key| {
                filter
                    .try_contains(key.as_ref())
                    .ok_or_else(|| Error::invalid_state(format!("filter {} is not resident", name)))
            })
            .collect()
    }

    /// Writes the dirty pages and record of the filter `name`.
    pub fn flush_filter(&self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        let mut filter = entry.write()?;
        filter.flush()
    }

    /// Flushes every filter.
    ///
    /// All filters are attempted; the first error is returned.
    pub fn flush_all(&self) -> Result<()> {
        let mut first_error = None;
        for e in self.filters.iter() {
            let result = e.value().write().and_then(|mut filter| filter.flush());
            match result {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    log::warn!("Failed to flush filter {}: {}", e.key(), err);
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Flushes the filter `name` and releases its page buffers.
    ///
    /// The next access pages the filter back in. A no-op for in-memory
    /// filters.
    pub fn unmap_filter(&self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        let mut filter = entry.write()?;
        filter.unmap()?;
        if filter.state() == FilterState::Unmapped {
            log::info!("Unmapped filter {}", name);
        }
        Ok(())
    }

    /// Describes the filter `name`.
    pub fn filter_info(&self, name: &str) -> Result<FilterInfo> {
        let entry = self.entry(name)?;
        let filter = entry.read()?;
        Ok(filter.info())
    }
}

impl std::fmt::Debug for FilterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterManager")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl Drop for FilterManager {
    fn drop(&mut self) {
        // Persist and release everything; data is never deleted here.
        for e in self.filters.iter() {
            let mut filter = e.value().lock_any();
            if filter.state() == FilterState::Deleted {
                continue;
            }
            if let Err(err) = filter.flush() {
                log::warn!("Error flushing filter {} during shutdown: {}", e.key(), err);
                continue;
            }
            if let Err(err) = filter.unmap() {
                log::warn!("Error unmapping filter {} during shutdown: {}", e.key(), err);
            }
        }
    }
}
