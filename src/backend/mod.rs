//! Persistence backends for filter pages.
//!
//! A backend stores, per filter name, an isolated set of page images and
//! one small [`FilterRecord`]. Filters kept purely in memory never talk to a
//! backend.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bloomstore::backend::{Backend, FileBackend};
//!
//! # fn main() -> Result<(), bloomstore::Error> {
//! let backend = FileBackend::open("/tmp/bloomstore")?;
//! for name in backend.discover()? {
//!     println!("found filter {}", name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod file;

pub use file::FileBackend;

use crate::config::FilterConfig;
use crate::error::{Error, Result};
use crate::page::PageHeader;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage for filter pages and filter records.
///
/// Implementations must be safe to share between threads. Each filter name
/// is an independent namespace; operations on different names must not
/// interfere with each other.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Lists the names of every filter with persisted state.
    fn discover(&self) -> Result<Vec<String>>;

    /// Lists the page indices persisted for `filter` in ascending order, or
    /// `None` if nothing is persisted under that name.
    fn read_existing(&self, filter: &str) -> Result<Option<Vec<u32>>>;

    /// Returns the bit array of page `index`, creating a zeroed page described
    /// by `header` if it does not exist yet.
    ///
    /// An existing page must match the geometry in `header`.
    fn open_or_create(&self, filter: &str, index: u32, header: &PageHeader) -> Result<Vec<u8>>;

    /// Reads page `index` including its persisted header.
    fn read_page(&self, filter: &str, index: u32) -> Result<(PageHeader, Vec<u8>)>;

    /// Persists the header and bit array of page `index`.
    fn write_page(&self, filter: &str, index: u32, header: &PageHeader, bits: &[u8]) -> Result<()>;

    /// Reads the filter record, or `None` if none was stored.
    fn load_record(&self, filter: &str) -> Result<Option<FilterRecord>>;

    /// Replaces the filter record.
    fn store_record(&self, filter: &str, record: &FilterRecord) -> Result<()>;

    /// Deletes every page and the record of `filter`. Removing an unknown
    /// filter is not an error.
    fn remove(&self, filter: &str) -> Result<()>;
}

/// Persisted per-filter metadata.
///
/// Carries the filter's configuration plus the summary figures reported for
/// a filter that has been discovered but not loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterRecord {
    /// The configuration the filter was created with.
    pub config: FilterConfig,
    /// Number of keys added.
    pub size: u64,
    /// Total key capacity of all pages.
    pub capacity: u64,
    /// Total size of all bit arrays in bytes.
    pub byte_size: u64,
    /// Number of pages.
    pub pages: u32,
}

impl FilterRecord {
    /// A record for a filter that has no pages yet.
    pub fn empty(config: FilterConfig) -> Self {
        Self { config, size: 0, capacity: config.capacity, byte_size: 0, pages: 0 }
    }

    /// Encodes the record as bincode followed by a crc32 of the payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = bincode::serialize(self)?;
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes a record written by [`FilterRecord::encode`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("Filter record too short"));
        }
        let (payload, trailer) = data.split_at(data.len() - 4);
        let mut raw = [0u8; 4];
        raw.copy_from_slice(trailer);
        let expected = u32::from_le_bytes(raw);
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let record: FilterRecord = bincode::deserialize(payload)?;
        record.config.validate().map_err(|e| Error::corruption(format!("Stored config rejected: {}", e)))?;
        Ok(record)
    }
}
