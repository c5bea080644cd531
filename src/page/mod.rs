//! Bit pages: the unit of storage and persistence of a filter.
//!
//! A [`BitPage`] is one fixed-size bloom bit array with its own hash
//! parameterization. Its buffer is either resident ([`PageBuffer::Mapped`])
//! or released to the backend ([`PageBuffer::Unmapped`]); every accessor
//! checks residency instead of assuming it.
//!
//! ## Sizing
//!
//! For `n` expected keys at false positive probability `p`:
//!
//! - `num_bits = ceil(-n * ln(p) / ln(2)^2)`
//! - `num_hashes = round((num_bits / n) * ln(2))`

mod hash;
mod header;

pub use hash::KeyHash;
pub use header::{PageHeader, PAGE_HEADER_SIZE, PAGE_MAGIC};

use crate::backend::Backend;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Upper bound on the number of hash functions per page.
const MAX_HASHES: u32 = 32;

/// Computes `(num_bits, num_hashes)` for `expected_keys` at `probability`.
pub fn page_params(expected_keys: u64, probability: f64) -> (u64, u32) {
    let n = expected_keys.max(1) as f64;
    let ln2 = std::f64::consts::LN_2;

    let num_bits = ((-n * probability.ln()) / (ln2 * ln2)).ceil().max(1.0) as u64;
    let num_hashes = ((num_bits as f64 / n) * ln2).round() as u32;

    (num_bits, num_hashes.clamp(1, MAX_HASHES))
}

/// Where a page persists itself.
#[derive(Debug, Clone)]
pub struct PageStore {
    backend: Arc<dyn Backend>,
    filter: Arc<str>,
}

impl PageStore {
    /// A store for pages of `filter` in `backend`.
    pub fn new(backend: Arc<dyn Backend>, filter: impl Into<Arc<str>>) -> Self {
        Self { backend, filter: filter.into() }
    }

    /// The backend.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// The owning filter's name.
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Residency of a page's bit array.
#[derive(Debug)]
pub enum PageBuffer {
    /// The bit array is in memory.
    Mapped(Vec<u8>),
    /// The bit array lives only in the backend.
    Unmapped,
}

/// A single bloom bit array.
#[derive(Debug)]
pub struct BitPage {
    index: u32,
    header: PageHeader,
    buffer: PageBuffer,
    dirty: bool,
    store: Option<PageStore>,
}

impl BitPage {
    /// Creates page `index` sized for `expected_keys` at `probability`.
    ///
    /// With a store the page is created in (or reopened from) the backend;
    /// without one it is a plain in-memory buffer.
    pub fn create(
        index: u32,
        expected_keys: u64,
        probability: f64,
        store: Option<PageStore>,
    ) -> Result<Self> {
        let (num_bits, num_hashes) = page_params(expected_keys, probability);
        let header = PageHeader { num_hashes, num_bits, expected_keys, probability, count: 0 };

        let bits = match &store {
            Some(store) => store.backend.open_or_create(&store.filter, index, &header)?,
            None => vec![0u8; header.bitmap_len()],
        };

        Ok(Self { index, header, buffer: PageBuffer::Mapped(bits), dirty: false, store })
    }

    /// Loads an existing page from its store.
    pub fn load(index: u32, store: PageStore) -> Result<Self> {
        let (header, bits) = store.backend.read_page(&store.filter, index)?;
        Ok(Self { index, header, buffer: PageBuffer::Mapped(bits), dirty: false, store: Some(store) })
    }

    /// Sets the bits of `key`. Returns true if at least one bit went from 0 to 1.
    pub fn set(&mut self, key: &KeyHash) -> Result<bool> {
        let bits = match &mut self.buffer {
            PageBuffer::Mapped(bits) => bits,
            PageBuffer::Unmapped => return Err(not_mapped(self.index)),
        };

        let mut changed = false;
        for pos in key.positions(self.header.num_hashes, self.header.num_bits) {
            let byte = &mut bits[(pos / 8) as usize];
            let mask = 1u8 << (pos % 8);
            if *byte & mask == 0 {
                *byte |= mask;
                changed = true;
            }
        }

        if changed {
            self.dirty = true;
        }
        Ok(changed)
    }

    /// Returns true if every bit of `key` is set.
    pub fn test(&self, key: &KeyHash) -> Result<bool> {
        let PageBuffer::Mapped(bits) = &self.buffer else {
            return Err(not_mapped(self.index));
        };

        Ok(key
            .positions(self.header.num_hashes, self.header.num_bits)
            .all(|pos| bits[(pos / 8) as usize] & (1u8 << (pos % 8)) != 0))
    }

    /// Records one more key stored in this page.
    pub fn increment_count(&mut self) {
        self.header.count += 1;
        self.dirty = true;
    }

    /// Writes dirty content to the backend.
    ///
    /// A no-op for in-memory, clean or unmapped pages. On failure the page
    /// stays dirty.
    pub fn flush(&mut self) -> Result<()> {
        let (Some(store), PageBuffer::Mapped(bits)) = (&self.store, &self.buffer) else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        store.backend.write_page(&store.filter, self.index, &self.header, bits)?;
        self.dirty = false;
        Ok(())
    }

    /// Re-acquires the buffer from the backend.
    ///
    /// The page must still be persisted with the same geometry; a page that
    /// vanished is reported as corruption rather than recreated empty.
    /// Returns true if the page was actually read in.
    pub fn map(&mut self) -> Result<bool> {
        if self.is_mapped() {
            return Ok(false);
        }
        let Some(store) = &self.store else {
            return Err(Error::invalid_state("in-memory page lost its buffer"));
        };

        let (stored, bits) = store.backend.read_page(&store.filter, self.index)?;
        if stored.num_bits != self.header.num_bits
            || stored.num_hashes != self.header.num_hashes
            || bits.len() != self.header.bitmap_len()
        {
            return Err(Error::corruption(format!(
                "page {} of {} changed geometry: stored {} bits/{} hashes, expected {} bits/{} hashes",
                self.index,
                store.filter,
                stored.num_bits,
                stored.num_hashes,
                self.header.num_bits,
                self.header.num_hashes
            )));
        }
        self.buffer = PageBuffer::Mapped(bits);
        Ok(true)
    }

    /// Persists dirty content and releases the buffer.
    ///
    /// In-memory pages cannot be paged out and keep their buffer. Returns true
    /// if the buffer was actually released.
    pub fn unmap(&mut self) -> Result<bool> {
        if self.store.is_none() || !self.is_mapped() {
            return Ok(false);
        }
        self.flush()?;
        self.buffer = PageBuffer::Unmapped;
        Ok(true)
    }

    /// Returns true if the bit array is resident.
    pub fn is_mapped(&self) -> bool {
        matches!(self.buffer, PageBuffer::Mapped(_))
    }

    /// Returns true if the page has changes not yet written to the backend.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true if the page has no backing store.
    pub fn is_in_memory(&self) -> bool {
        self.store.is_none()
    }

    /// The page index within its filter.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The page header.
    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    /// Capacity in bits.
    pub fn num_bits(&self) -> u64 {
        self.header.num_bits
    }

    /// Number of hash functions.
    pub fn num_hashes(&self) -> u32 {
        self.header.num_hashes
    }

    /// Number of keys the page was sized for.
    pub fn expected_keys(&self) -> u64 {
        self.header.expected_keys
    }

    /// Number of keys stored in the page.
    pub fn count(&self) -> u64 {
        self.header.count
    }

    /// Returns true once the page holds as many keys as it was sized for.
    pub fn is_full(&self) -> bool {
        self.header.count >= self.header.expected_keys
    }

    /// Size of the bit array in bytes.
    pub fn byte_size(&self) -> u64 {
        self.header.bitmap_len() as u64
    }
}

fn not_mapped(index: u32) -> Error {
    Error::invalid_state(format!("page {} is not mapped", index))
}
