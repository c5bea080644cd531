//! Directory-backed persistence.
//!
//! Layout under the root directory:
//! ```text
//! bloomstore.<filter>/filter.meta
//! bloomstore.<filter>/page.000000.bits
//! bloomstore.<filter>/page.000001.bits
//! ```
//!
//! Removal first renames the filter directory to `deleted.<filter>`, so a
//! filter whose files could not all be unlinked is never discovered again.
//! Such leftovers are purged the next time the backend is opened.

use super::{Backend, FilterRecord};
use crate::error::{Error, Result};
use crate::page::{PageHeader, PAGE_HEADER_SIZE};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Prefix of every filter directory.
pub const FILTER_DIR_PREFIX: &str = "bloomstore.";

/// Prefix of a removed filter directory awaiting deletion.
pub const TRASH_DIR_PREFIX: &str = "deleted.";

const RECORD_FILENAME: &str = "filter.meta";
const RECORD_TMP_FILENAME: &str = "filter.meta.tmp";

/// Generate the filename of page `index`.
pub fn page_filename(index: u32) -> String {
    format!("page.{:06}.bits", index)
}

/// Parse a page filename to extract the page index.
pub fn parse_page_filename(filename: &str) -> Option<u32> {
    filename.strip_prefix("page.")?.strip_suffix(".bits")?.parse().ok()
}

/// Backend storing each filter in its own directory below a root directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Opens a backend rooted at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root)?;
        } else if !root.is_dir() {
            return Err(Error::invalid_config(format!("data_dir is not a directory: {:?}", root)));
        }
        let backend = Self { root };
        backend.purge_trash()?;
        Ok(backend)
    }

    fn purge_trash(&self) -> Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let is_trash = entry.file_name().to_str().is_some_and(|n| n.starts_with(TRASH_DIR_PREFIX));
            if is_trash && entry.file_type()?.is_dir() {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    log::warn!("Failed to purge {:?}: {}", entry.path(), e);
                }
            }
        }
        Ok(())
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the state of `filter`.
    pub fn filter_dir(&self, filter: &str) -> PathBuf {
        self.root.join(format!("{}{}", FILTER_DIR_PREFIX, filter))
    }

    fn page_path(&self, filter: &str, index: u32) -> PathBuf {
        self.filter_dir(filter).join(page_filename(index))
    }

    fn create_page(&self, path: &Path, header: &PageHeader) -> Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(&header.encode())?;
        // Extending the file zero-fills the bit array.
        file.set_len((PAGE_HEADER_SIZE + header.bitmap_len()) as u64)?;
        file.sync_all()?;
        Ok(())
    }
}

impl Backend for FileBackend {
    fn discover(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(filename) = entry.file_name().to_str() {
                if let Some(name) = filename.strip_prefix(FILTER_DIR_PREFIX) {
                    if !name.is_empty() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_existing(&self, filter: &str) -> Result<Option<Vec<u32>>> {
        let dir = self.filter_dir(filter);
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut pages = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(index) = entry.file_name().to_str().and_then(parse_page_filename) {
                pages.push(index);
            }
        }
        pages.sort_unstable();
        Ok(Some(pages))
    }

    fn open_or_create(&self, filter: &str, index: u32, header: &PageHeader) -> Result<Vec<u8>> {
        let path = self.page_path(filter, index);
        if !path.exists() {
            fs::create_dir_all(self.filter_dir(filter))?;
            self.create_page(&path, header)?;
            log::debug!("Created page {:?} ({} bytes)", path, header.bitmap_len());
            return Ok(vec![0u8; header.bitmap_len()]);
        }

        let (stored, bits) = self.read_page(filter, index)?;
        if stored.num_bits != header.num_bits || stored.num_hashes != header.num_hashes {
            return Err(Error::corruption(format!(
                "Page {:?} geometry mismatch: stored {} bits/{} hashes, expected {} bits/{} hashes",
                path, stored.num_bits, stored.num_hashes, header.num_bits, header.num_hashes
            )));
        }
        Ok(bits)
    }

    fn read_page(&self, filter: &str, index: u32) -> Result<(PageHeader, Vec<u8>)> {
        let path = self.page_path(filter, index);
        let mut data = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::corruption(format!("Page {:?} is missing", path)),
            _ => Error::Io(e),
        })?;
        let header = PageHeader::decode(&data)?;

        let expected_len = PAGE_HEADER_SIZE + header.bitmap_len();
        if data.len() != expected_len {
            return Err(Error::corruption(format!(
                "Page {:?} size mismatch: expected {}, got {}",
                path,
                expected_len,
                data.len()
            )));
        }

        let bits = data.split_off(PAGE_HEADER_SIZE);
        Ok((header, bits))
    }

    fn write_page(&self, filter: &str, index: u32, header: &PageHeader, bits: &[u8]) -> Result<()> {
        if bits.len() != header.bitmap_len() {
            return Err(Error::invalid_argument(format!(
                "bit array of {} bytes does not match header ({} bytes)",
                bits.len(),
                header.bitmap_len()
            )));
        }

        let path = self.page_path(filter, index);
        let mut file = OpenOptions::new().write(true).create(true).open(&path)?;
        file.write_all(&header.encode())?;
        file.write_all(bits)?;
        file.sync_data()?;
        Ok(())
    }

    fn load_record(&self, filter: &str) -> Result<Option<FilterRecord>> {
        let path = self.filter_dir(filter).join(RECORD_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        FilterRecord::decode(&data).map(Some)
    }

    fn store_record(&self, filter: &str, record: &FilterRecord) -> Result<()> {
        let dir = self.filter_dir(filter);
        fs::create_dir_all(&dir)?;

        let tmp_path = dir.join(RECORD_TMP_FILENAME);
        let encoded = record.encode()?;
        {
            let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, dir.join(RECORD_FILENAME))?;
        Ok(())
    }

    fn remove(&self, filter: &str) -> Result<()> {
        let dir = self.filter_dir(filter);
        if !dir.exists() {
            return Ok(());
        }

        let trash = self.root.join(format!("{}{}", TRASH_DIR_PREFIX, filter));
        if trash.exists() {
            fs::remove_dir_all(&trash)?;
        }
        fs::rename(&dir, &trash)?;
        if let Err(e) = fs::remove_dir_all(&trash) {
            log::warn!("Failed to purge {:?}: {}", trash, e);
        }
        log::info!("Removed filter directory {:?}", dir);
        Ok(())
    }
}
