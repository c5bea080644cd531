//! Page file header.
//!
//! Every persisted page starts with a fixed 48-byte header followed by the
//! raw bit array.
//!
//! Format (little endian):
//! ```text
//! [magic: 4 bytes]
//! [num_hashes: 4 bytes]
//! [num_bits: 8 bytes]
//! [expected_keys: 8 bytes]
//! [probability: 8 bytes, f64 bits]
//! [count: 8 bytes]
//! [crc32 of the preceding 40 bytes: 4 bytes]
//! [reserved: 4 bytes]
//! ```

use crate::error::{Error, Result};

/// Magic number identifying a page file ("BLOM").
pub const PAGE_MAGIC: u32 = 0x424C_4F4D;

/// Encoded size of a [`PageHeader`].
pub const PAGE_HEADER_SIZE: usize = 48;

const CHECKSUMMED_LEN: usize = 40;

/// Parameters and fill count of a page, as persisted in its header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageHeader {
    /// Number of hash functions (k).
    pub num_hashes: u32,
    /// Capacity of the bit array in bits.
    pub num_bits: u64,
    /// Number of keys the page was sized for.
    pub expected_keys: u64,
    /// False positive target the page was sized for.
    pub probability: f64,
    /// Number of keys added to the page.
    pub count: u64,
}

impl PageHeader {
    /// Size in bytes of the bit array described by this header.
    pub fn bitmap_len(&self) -> usize {
        ((self.num_bits + 7) / 8) as usize
    }

    /// Encode the header to bytes (48 bytes).
    pub fn encode(&self) -> [u8; PAGE_HEADER_SIZE] {
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&PAGE_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.num_hashes.to_le_bytes());
        buf[8..16].copy_from_slice(&self.num_bits.to_le_bytes());
        buf[16..24].copy_from_slice(&self.expected_keys.to_le_bytes());
        buf[24..32].copy_from_slice(&self.probability.to_bits().to_le_bytes());
        buf[32..40].copy_from_slice(&self.count.to_le_bytes());

        let crc = crc32fast::hash(&buf[..CHECKSUMMED_LEN]);
        buf[40..44].copy_from_slice(&crc.to_le_bytes());
        // 44..48 reserved
        buf
    }

    /// Decode a header from the first 48 bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < PAGE_HEADER_SIZE {
            return Err(Error::corruption(format!(
                "Page header too short: expected {}, got {}",
                PAGE_HEADER_SIZE,
                data.len()
            )));
        }

        let magic = read_u32(data, 0);
        if magic != PAGE_MAGIC {
            return Err(Error::corruption(format!(
                "Invalid page magic number: expected {:#x}, got {:#x}",
                PAGE_MAGIC, magic
            )));
        }

        let expected = read_u32(data, 40);
        let actual = crc32fast::hash(&data[..CHECKSUMMED_LEN]);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let header = Self {
            num_hashes: read_u32(data, 4),
            num_bits: read_u64(data, 8),
            expected_keys: read_u64(data, 16),
            probability: f64::from_bits(read_u64(data, 24)),
            count: read_u64(data, 32),
        };

        if header.num_bits == 0 || header.num_hashes == 0 {
            return Err(Error::corruption("Page header describes an empty bitmap"));
        }

        Ok(header)
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(raw)
}
