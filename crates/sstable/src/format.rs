//! On-disk format primitives: footer, block index, and the shared size
//! constants of the SSTable layout.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;

use crate::SstError;

/// Identifies a valid SSTable file ("SILTKV" in ASCII).
pub const MAGIC: u64 = 0x53494C544B56;
/// Fixed footer size: bloom_offset + index_offset + index_size + magic.
pub const FOOTER_SIZE: usize = 32;
/// Target size of a data block (4 KiB).
pub const BLOCK_SIZE: usize = 4 * 1024;
/// Maximum data size of a compaction output before rolling to a new file.
pub const MAX_FILE_SIZE: u64 = 64 * 1024 * 1024;
/// Per-record header: key_len + val_len.
pub const RECORD_HEADER_SIZE: usize = 8;
/// Largest key a well-formed record may carry; reads reject anything bigger.
pub const MAX_KEY_SIZE: usize = 128;
/// Largest value a well-formed record may carry.
pub const MAX_VALUE_SIZE: usize = 4 * 1024;

/// Trailing metadata of an SSTable file.
///
/// Serialized as four u64 little-endian fields:
/// `bloom_offset || index_offset || index_size || magic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// File offset of the serialized bloom filter.
    pub bloom_offset: u64,
    /// File offset of the serialized block index (also the end of the data
    /// section).
    pub index_offset: u64,
    /// Size in bytes of the serialized block index.
    pub index_size: u64,
}

impl Footer {
    /// Serializes the footer to its fixed 32-byte form.
    #[must_use]
    pub fn serialize(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&self.bloom_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.index_size.to_le_bytes());
        buf[24..32].copy_from_slice(&MAGIC.to_le_bytes());
        buf
    }

    /// Parses a footer, failing on a short slice or a magic mismatch.
    pub fn deserialize(data: &[u8]) -> Result<Self, SstError> {
        if data.len() < FOOTER_SIZE {
            return Err(SstError::Corruption("footer too short".into()));
        }
        let mut rdr = data;
        let bloom_offset = rdr.read_u64::<LittleEndian>()?;
        let index_offset = rdr.read_u64::<LittleEndian>()?;
        let index_size = rdr.read_u64::<LittleEndian>()?;
        let magic = rdr.read_u64::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(SstError::Corruption(format!(
                "bad magic {:#x}, expected {:#x}",
                magic, MAGIC
            )));
        }
        Ok(Self {
            bloom_offset,
            index_offset,
            index_size,
        })
    }
}

/// One block of the sparse index: the block's first key and file offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndexEntry {
    pub first_key: Vec<u8>,
    pub offset: u64,
}

/// Sparse index over the data section: one entry per block, sorted by first
/// key (which equals write order, because the input iterator is ordered).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockIndex {
    pub entries: Vec<BlockIndexEntry>,
}

impl BlockIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, first_key: Vec<u8>, offset: u64) {
        self.entries.push(BlockIndexEntry { first_key, offset });
    }

    /// Binary-searches for the block that might hold `key`: the last entry
    /// whose first key is `<= key`. `None` means no block can contain it.
    #[must_use]
    pub fn find_block(&self, key: &[u8]) -> Option<usize> {
        let mut lo = 0isize;
        let mut hi = self.entries.len() as isize - 1;
        let mut found = None;
        while lo <= hi {
            let mid = (lo + hi) / 2;
            if self.entries[mid as usize].first_key.as_slice() <= key {
                found = Some(mid as usize);
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }
        found
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the index.
    ///
    /// Format: `entry_count (u32 LE)`, then per entry
    /// `key_len (u32 LE) || key || block_offset (u64 LE)`.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writes to a Vec cannot fail.
        let _ = buf.write_u32::<LittleEndian>(self.entries.len() as u32);
        for entry in &self.entries {
            let _ = buf.write_u32::<LittleEndian>(entry.first_key.len() as u32);
            buf.extend_from_slice(&entry.first_key);
            let _ = buf.write_u64::<LittleEndian>(entry.offset);
        }
        buf
    }

    /// Parses an index previously produced by [`serialize`](Self::serialize).
    pub fn deserialize(data: &[u8]) -> Result<Self, SstError> {
        let mut rdr = data;
        let count = rdr
            .read_u32::<LittleEndian>()
            .map_err(|_| SstError::Corruption("block index too short".into()))?;

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key_len = rdr
                .read_u32::<LittleEndian>()
                .map_err(|_| SstError::Corruption("block index entry truncated".into()))?
                as usize;
            if key_len > MAX_KEY_SIZE {
                return Err(SstError::Corruption(format!(
                    "block index key length {} exceeds maximum {}",
                    key_len, MAX_KEY_SIZE
                )));
            }
            let mut key = vec![0u8; key_len];
            rdr.read_exact(&mut key)
                .map_err(|_| SstError::Corruption("block index key truncated".into()))?;
            let offset = rdr
                .read_u64::<LittleEndian>()
                .map_err(|_| SstError::Corruption("block index offset truncated".into()))?;
            entries.push(BlockIndexEntry {
                first_key: key,
                offset,
            });
        }
        Ok(Self { entries })
    }
}
