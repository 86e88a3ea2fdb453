//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the SiltKV storage engine.
//!
//! When an in-memory [`memtable::Memtable`] fills up, the engine freezes it
//! and flushes it to disk as an SSTable. SSTables are *write-once,
//! read-many*: once created they are never modified, only replaced during
//! compaction.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION: blocks of records, target block size 4 KiB      │
//! │                                                               │
//! │ key_len (u32 LE) | val_len (u32 LE) | key | value             │
//! │                                                               │
//! │ ... a record never straddles two blocks ...                   │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOCK INDEX: entry_count (u32), then per block                │
//! │ key_len (u32 LE) | first_key | block_offset (u64 LE)          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM FILTER: bit_count (u32) | hash_count (u32) | bits       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (32 bytes):                                            │
//! │ bloom_offset (u64) | index_offset (u64)                       │
//! │ index_size (u64) | magic (u64) = "SILTKV"                     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The record encoding matches the WAL record minus its checksum slot:
//! integrity of an SSTable is covered by the footer magic and by the fact
//! that the file is produced in one shot from already-validated memtable
//! data. `val_len == 0` marks a tombstone. All integers little-endian.
//!
//! A file whose footer fails validation is read in **legacy mode**: the
//! whole file is treated as a flat record sequence with no index or bloom
//! filter, and lookups fall back to a linear scan.

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{
    BlockIndex, Footer, BLOCK_SIZE, FOOTER_SIZE, MAGIC, MAX_FILE_SIZE, MAX_KEY_SIZE,
    MAX_VALUE_SIZE, RECORD_HEADER_SIZE,
};
pub use merge::MergeIterator;
pub use reader::{SstIter, SstReader};
pub use writer::{SstWriter, DEFAULT_FALSE_POSITIVE_RATE};

use memtable::SortedMapIter;
use thiserror::Error;

/// Errors surfaced by SSTable operations.
#[derive(Debug, Error)]
pub enum SstError {
    /// Structural damage: bad magic, impossible offsets, malformed lengths.
    #[error("sstable: corrupt file: {0}")]
    Corruption(String),

    /// An underlying I/O error.
    #[error("sstable: io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability set shared by every ordered record stream in the engine:
/// the memtable iterator, the SSTable file iterator, and the k-way merge.
///
/// An iterator is *positioned*: after construction it either sits on the
/// first record (`valid() == true`) or the source is empty. `key`/`value`
/// may only be consulted while valid; `value() == None` is a tombstone.
pub trait OrderedIterator {
    fn valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> Option<&[u8]>;
    fn next(&mut self) -> Result<(), SstError>;
}

impl OrderedIterator for memtable::SortedMapIter<'_> {
    fn valid(&self) -> bool {
        SortedMapIter::valid(self)
    }

    fn key(&self) -> &[u8] {
        SortedMapIter::key(self)
    }

    fn value(&self) -> Option<&[u8]> {
        SortedMapIter::value(self)
    }

    fn next(&mut self) -> Result<(), SstError> {
        self.advance();
        Ok(())
    }
}

#[cfg(test)]
mod tests;
