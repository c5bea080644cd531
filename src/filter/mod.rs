//! Scalable filters.
//!
//! A [`ScalableFilter`] presents one logical set-membership structure built
//! from an append-only sequence of [`BitPage`]s. Each new page is larger than
//! the last and targets a tighter false positive probability, so the filter
//! grows without bound while the overall false positive rate stays below the
//! configured target.
//!
//! ## Lifecycle
//!
//! ```text
//! PROXIED --first access--> ACTIVE <--unmap / access--> UNMAPPED
//!    \                        |                            /
//!     `---------------------> DELETED <-------------------'
//! ```
//!
//! Every state change goes through a single transition function so that
//! illegal transitions are rejected in one place.

mod counters;

pub use counters::{CounterSnapshot, FilterCounters};

use crate::backend::{Backend, FilterRecord};
use crate::config::FilterConfig;
use crate::error::{Error, Result};
use crate::page::{BitPage, KeyHash, PageStore};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterState {
    /// Known by name but not materialized.
    Proxied,
    /// Pages are resident.
    Active,
    /// Pages were released to the backend.
    Unmapped,
    /// Storage was removed. Terminal.
    Deleted,
}

impl FilterState {
    fn can_transition_to(self, next: FilterState) -> bool {
        use FilterState::*;
        matches!(
            (self, next),
            (Proxied, Active) | (Active, Unmapped) | (Unmapped, Active) | (Proxied | Active | Unmapped, Deleted)
        )
    }
}

impl fmt::Display for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterState::Proxied => "proxied",
            FilterState::Active => "active",
            FilterState::Unmapped => "unmapped",
            FilterState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Result of adding a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The key was not present and has been inserted.
    Added,
    /// The key was (probably) already present; nothing changed.
    AlreadyPresent,
}

impl AddOutcome {
    /// Returns true if the key was newly inserted.
    pub fn is_added(self) -> bool {
        self == AddOutcome::Added
    }
}

/// A point-in-time description of a filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterInfo {
    /// Filter name.
    pub name: String,
    /// Lifecycle state.
    pub state: FilterState,
    /// Configured false positive target.
    pub probability: f64,
    /// Number of keys added.
    pub size: u64,
    /// Total key capacity of all pages.
    pub capacity: u64,
    /// Total size of all bit arrays in bytes.
    pub byte_size: u64,
    /// Number of pages.
    pub pages: u32,
    /// Whether the filter lives only in memory.
    pub in_memory: bool,
    /// Operation counters.
    pub counters: CounterSnapshot,
}

/// A named, growable bloom filter with paging to a backend.
///
/// # Example
///
/// ```rust
/// use bloomstore::{FilterConfig, ScalableFilter};
///
/// # fn main() -> Result<(), bloomstore::Error> {
/// let mut filter = ScalableFilter::create("users", FilterConfig::new(1000, 0.01), None)?;
/// assert!(filter.add(b"alice")?.is_added());
/// assert!(!filter.add(b"alice")?.is_added());
/// assert!(filter.contains(b"alice")?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ScalableFilter {
    name: String,
    config: FilterConfig,
    state: FilterState,
    pages: Vec<BitPage>,
    counters: FilterCounters,
    backend: Option<Arc<dyn Backend>>,
    /// Summary reported while the filter is proxied.
    record: FilterRecord,
}

impl ScalableFilter {
    /// Creates a new ACTIVE filter with its first page allocated.
    ///
    /// `backend` is ignored when `config.in_memory` is set. If the backend
    /// already holds data under `name`, that data is re-attached and its
    /// stored configuration wins over `config`.
    pub fn create(
        name: impl Into<String>,
        config: FilterConfig,
        backend: Option<Arc<dyn Backend>>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let backend = backend.filter(|_| !config.in_memory);

        let existing = match &backend {
            Some(b) => b.load_record(&name)?,
            None => None,
        };
        let fresh = existing.is_none();

        let mut filter = match existing {
            Some(record) => {
                log::info!("Re-attaching persisted data for filter {}", name);
                Self::from_record(name, record, backend)
            }
            None => {
                if let Some(b) = &backend {
                    b.store_record(&name, &FilterRecord::empty(config))?;
                }
                Self::proxied(name, config, backend)
            }
        };

        if let Err(e) = filter.ensure_resident() {
            if let (true, Some(b)) = (fresh, &filter.backend) {
                // Leave no trace of a filter that never came to exist.
                if let Err(cleanup) = b.remove(&filter.name) {
                    log::warn!("Failed to clean up filter {}: {}", filter.name, cleanup);
                }
            }
            return Err(e);
        }
        Ok(filter)
    }

    /// Creates a PROXIED filter: known by name, materialized on first access.
    ///
    /// No storage is touched.
    pub fn proxied(
        name: impl Into<String>,
        config: FilterConfig,
        backend: Option<Arc<dyn Backend>>,
    ) -> Self {
        Self::from_record(name.into(), FilterRecord::empty(config), backend.filter(|_| !config.in_memory))
    }

    /// Creates a PROXIED filter for persisted state found in `backend`.
    ///
    /// The stored record supplies the configuration and the summary reported
    /// until the filter is loaded. `fallback` is used when no record exists.
    pub fn discover(name: impl Into<String>, backend: Arc<dyn Backend>, fallback: FilterConfig) -> Result<Self> {
        let name = name.into();
        let record = backend.load_record(&name)?.unwrap_or_else(|| FilterRecord::empty(fallback));
        Ok(Self::from_record(name, record, Some(backend)))
    }

    fn from_record(name: String, record: FilterRecord, backend: Option<Arc<dyn Backend>>) -> Self {
        Self {
            name,
            config: record.config,
            state: FilterState::Proxied,
            pages: Vec::new(),
            counters: FilterCounters::default(),
            backend,
            record,
        }
    }

    /// Adds `key`, paging the filter in first if needed.
    ///
    /// Keys already reported present by any page are not inserted again.
    /// New keys go to the latest page; a new page is appended first when
    /// the latest one has reached its design capacity.
    pub fn add(&mut self, key: &[u8]) -> Result<AddOutcome> {
        self.ensure_resident()?;
        let hash = KeyHash::new(key);

        if self.test_pages(&hash) {
            self.counters.record_set(false);
            return Ok(AddOutcome::AlreadyPresent);
        }

        if self.pages.last().map_or(true, BitPage::is_full) {
            self.grow()?;
        }

        let page = self
            .pages
            .last_mut()
            .ok_or_else(|| Error::invalid_state(format!("filter {} has no pages", self.name)))?;
        page.set(&hash)?;
        page.increment_count();

        self.counters.record_set(true);
        Ok(AddOutcome::Added)
    }

    /// Checks `key`, paging the filter in first if needed.
    pub fn contains(&mut self, key: &[u8]) -> Result<bool> {
        self.ensure_resident()?;
        self.try_contains(key)
            .ok_or_else(|| Error::invalid_state(format!("filter {} is not resident", self.name)))
    }

    /// Checks `key` without paging anything in.
    ///
    /// Returns `None` if the filter is not resident. This is the path used
    /// under a shared lock.
    pub fn try_contains(&self, key: &[u8]) -> Option<bool> {
        if !self.is_resident() {
            return None;
        }
        let found = self.test_pages(&KeyHash::new(key));
        self.counters.record_check(found);
        Some(found)
    }

    /// Newest page first: recently added keys are the most likely to be checked.
    fn test_pages(&self, hash: &KeyHash) -> bool {
        self.pages.iter().rev().any(|page| matches!(page.test(hash), Ok(true)))
    }

    /// Returns true if the filter is ACTIVE with every page mapped.
    pub fn is_resident(&self) -> bool {
        self.state == FilterState::Active && self.pages.iter().all(BitPage::is_mapped)
    }

    /// Brings the filter to ACTIVE with every page mapped.
    ///
    /// A PROXIED filter loads its persisted pages, or allocates its first page
    /// if none exist. On failure the filter stays in its previous state.
    pub fn ensure_resident(&mut self) -> Result<()> {
        match self.state {
            FilterState::Deleted => Err(self.deleted()),
            FilterState::Proxied => self.load(),
            FilterState::Active | FilterState::Unmapped => {
                let mut paged_in = 0;
                for page in &mut self.pages {
                    if page.map()? {
                        paged_in += 1;
                    }
                }
                if paged_in > 0 {
                    self.counters.add_page_ins(paged_in);
                    log::debug!("Paged in {} pages of filter {}", paged_in, self.name);
                }
                self.transition(FilterState::Active)
            }
        }
    }

    fn load(&mut self) -> Result<()> {
        let mut pages = Vec::new();

        if let Some(backend) = &self.backend {
            let indices = backend.read_existing(&self.name)?.unwrap_or_default();
            if indices.len() < self.record.pages as usize {
                return Err(Error::corruption(format!(
                    "filter {} has {} of {} pages",
                    self.name,
                    indices.len(),
                    self.record.pages
                )));
            }
            for (expected, index) in indices.into_iter().enumerate() {
                if index as usize != expected {
                    return Err(Error::corruption(format!(
                        "filter {} is missing page {}",
                        self.name, expected
                    )));
                }
                pages.push(BitPage::load(index, PageStore::new(backend.clone(), self.name.as_str()))?);
            }
        }

        let loaded = pages.len() as u64;
        self.pages = pages;
        if loaded > 0 {
            self.counters.add_page_ins(loaded);
            log::debug!("Loaded {} pages of filter {}", loaded, self.name);
        } else if let Err(e) = self.grow() {
            self.pages.clear();
            return Err(e);
        }

        self.transition(FilterState::Active)
    }

    fn grow(&mut self) -> Result<()> {
        let index = self.pages.len() as u32;
        let capacity = self.config.page_capacity(index);
        let probability = self.config.page_probability(index);
        let store = self.backend.as_ref().map(|b| PageStore::new(b.clone(), self.name.as_str()));

        let page = BitPage::create(index, capacity, probability, store)?;
        log::debug!(
            "Filter {} grew to {} pages (page {}: {} keys, {} bits, {} hashes)",
            self.name,
            index + 1,
            index,
            capacity,
            page.num_bits(),
            page.num_hashes()
        );
        self.pages.push(page);
        Ok(())
    }

    /// Writes every dirty page and the filter record to the backend.
    ///
    /// A no-op for PROXIED, UNMAPPED and in-memory filters.
    pub fn flush(&mut self) -> Result<()> {
        match self.state {
            FilterState::Deleted => return Err(self.deleted()),
            FilterState::Proxied | FilterState::Unmapped => return Ok(()),
            FilterState::Active => {}
        }
        let Some(backend) = self.backend.clone() else {
            return Ok(());
        };

        for page in &mut self.pages {
            page.flush()?;
        }
        let record = self.summary();
        backend.store_record(&self.name, &record)?;
        self.record = record;
        Ok(())
    }

    /// Flushes and releases every page buffer.
    ///
    /// In-memory filters cannot be paged out: their data stays resident and
    /// the call succeeds without changing state.
    pub fn unmap(&mut self) -> Result<()> {
        match self.state {
            FilterState::Deleted => return Err(self.deleted()),
            FilterState::Proxied | FilterState::Unmapped => return Ok(()),
            FilterState::Active => {}
        }
        if self.backend.is_none() {
            return Ok(());
        }

        self.flush()?;
        let mut paged_out = 0;
        for page in &mut self.pages {
            match page.unmap() {
                Ok(true) => paged_out += 1,
                Ok(false) => {}
                Err(e) => {
                    self.counters.add_page_outs(paged_out);
                    return Err(e);
                }
            }
        }
        self.counters.add_page_outs(paged_out);
        log::debug!("Paged out {} pages of filter {}", paged_out, self.name);

        self.transition(FilterState::Unmapped)
    }

    /// Removes all persisted state of the filter. Terminal.
    pub fn delete(&mut self) -> Result<()> {
        if self.state == FilterState::Deleted {
            return Err(self.deleted());
        }
        if let Some(backend) = &self.backend {
            backend.remove(&self.name)?;
        }
        self.pages.clear();
        self.transition(FilterState::Deleted)?;
        log::info!("Deleted filter {}", self.name);
        Ok(())
    }

    fn transition(&mut self, next: FilterState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(Error::invalid_state(format!(
                "filter {} cannot go from {} to {}",
                self.name, self.state, next
            )));
        }
        log::trace!("Filter {}: {} -> {}", self.name, self.state, next);
        self.state = next;
        Ok(())
    }

    fn deleted(&self) -> Error {
        Error::invalid_state(format!("filter {} was deleted", self.name))
    }

    fn summary(&self) -> FilterRecord {
        FilterRecord {
            config: self.config,
            size: self.size(),
            capacity: self.capacity(),
            byte_size: self.byte_size(),
            pages: self.pages.len() as u32,
        }
    }

    /// Filter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filter configuration.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Lifecycle state.
    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Returns true if the filter has not been materialized yet.
    pub fn is_proxied(&self) -> bool {
        self.state == FilterState::Proxied
    }

    /// Returns true if the filter never touches a backend.
    pub fn is_in_memory(&self) -> bool {
        self.backend.is_none()
    }

    /// Number of keys added.
    pub fn size(&self) -> u64 {
        match self.state {
            FilterState::Proxied => self.record.size,
            FilterState::Deleted => 0,
            _ => self.pages.iter().map(BitPage::count).sum(),
        }
    }

    /// Total key capacity; the configured capacity while no page exists.
    pub fn capacity(&self) -> u64 {
        match self.state {
            FilterState::Proxied => self.record.capacity,
            _ if self.pages.is_empty() => self.config.capacity,
            _ => self.pages.iter().map(BitPage::expected_keys).sum(),
        }
    }

    /// Total bytes of all bit arrays.
    pub fn byte_size(&self) -> u64 {
        match self.state {
            FilterState::Proxied => self.record.byte_size,
            _ => self.pages.iter().map(BitPage::byte_size).sum(),
        }
    }

    /// Number of pages.
    pub fn num_pages(&self) -> u32 {
        match self.state {
            FilterState::Proxied => self.record.pages,
            _ => self.pages.len() as u32,
        }
    }

    /// Live counters.
    pub fn counters(&self) -> &FilterCounters {
        &self.counters
    }

    /// A point-in-time description of the filter.
    pub fn info(&self) -> FilterInfo {
        FilterInfo {
            name: self.name.clone(),
            state: self.state,
            probability: self.config.probability,
            size: self.size(),
            capacity: self.capacity(),
            byte_size: self.byte_size(),
            pages: self.num_pages(),
            in_memory: self.is_in_memory(),
            counters: self.counters.snapshot(),
        }
    }
}
