//! Streaming SSTable writer: blocks, sparse index, bloom filter, footer.

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bloom::BloomFilter;

use crate::format::{BlockIndex, Footer, BLOCK_SIZE, FOOTER_SIZE, RECORD_HEADER_SIZE};
use crate::{OrderedIterator, SstError};

/// Target false-positive rate of the embedded bloom filter.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Writes one SSTable file from an ordered record stream.
///
/// Records are buffered into an in-memory block; when the next record would
/// push a non-empty block past [`BLOCK_SIZE`], the block is written out, its
/// `(first_key, offset)` pair is added to the index, and the record starts a
/// fresh block. A record therefore never straddles two blocks.
///
/// Bloom hash pairs are buffered per appended key; [`finish`](Self::finish)
/// sizes the filter with the exact key count before building it, so the
/// writer needs no capacity estimate up front (compaction inputs have none).
pub struct SstWriter {
    file: File,
    path: PathBuf,
    /// The open, not-yet-flushed block.
    block: Vec<u8>,
    /// First key of the open block; set when the block receives its first
    /// record, consumed when the block is flushed.
    block_first_key: Option<Vec<u8>>,
    index: BlockIndex,
    key_hashes: Vec<(u64, u64)>,
    /// Bytes of completed blocks already written to the file.
    data_written: u64,
}

impl SstWriter {
    /// Creates (truncating) the target file. SSTables are immutable, so the
    /// writer never appends to an existing file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SstError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            block: Vec::with_capacity(BLOCK_SIZE),
            block_first_key: None,
            index: BlockIndex::new(),
            key_hashes: Vec::new(),
            data_written: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record. Callers must append in ascending key order;
    /// `value == None` writes a tombstone (`val_len == 0`).
    pub fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<(), SstError> {
        let vsize = value.map_or(0, <[u8]>::len);
        let record_size = RECORD_HEADER_SIZE + key.len() + vsize;

        if !self.block.is_empty() && self.block.len() + record_size > BLOCK_SIZE {
            self.flush_block()?;
        }
        if self.block.is_empty() {
            self.block_first_key = Some(key.to_vec());
        }

        // Writes to a Vec cannot fail.
        let _ = self.block.write_u32::<LittleEndian>(key.len() as u32);
        let _ = self.block.write_u32::<LittleEndian>(vsize as u32);
        self.block.extend_from_slice(key);
        if let Some(value) = value {
            self.block.extend_from_slice(value);
        }

        self.key_hashes.push(bloom::hash_pair(key));
        Ok(())
    }

    /// Drains an ordered iterator into the writer, tombstones included.
    pub fn append_from_iterator(
        &mut self,
        iter: &mut dyn OrderedIterator,
    ) -> Result<(), SstError> {
        while iter.valid() {
            self.append(iter.key(), iter.value())?;
            iter.next()?;
        }
        Ok(())
    }

    /// Bytes of record data accepted so far (completed blocks plus the open
    /// block); excludes index, bloom filter, and footer.
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.data_written + self.block.len() as u64
    }

    /// Number of records appended so far.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.key_hashes.len()
    }

    /// Flushes the residual block, writes the block index, the bloom filter,
    /// and the footer, then fsyncs. Returns the final file size.
    pub fn finish(mut self) -> Result<u64, SstError> {
        self.flush_block()?;

        let index_offset = self.data_written;
        let index_bytes = self.index.serialize();
        self.file.write_all(&index_bytes)?;

        let bloom_offset = index_offset + index_bytes.len() as u64;
        let mut filter = BloomFilter::new(self.key_hashes.len(), DEFAULT_FALSE_POSITIVE_RATE);
        for &pair in &self.key_hashes {
            filter.insert_hash(pair);
        }
        let bloom_bytes = filter.to_bytes();
        self.file.write_all(&bloom_bytes)?;

        let footer = Footer {
            bloom_offset,
            index_offset,
            index_size: index_bytes.len() as u64,
        };
        self.file.write_all(&footer.serialize())?;

        self.file.sync_all()?;
        Ok(bloom_offset + bloom_bytes.len() as u64 + FOOTER_SIZE as u64)
    }

    /// Writes the open block to the file and indexes it. No-op when empty.
    fn flush_block(&mut self) -> Result<(), SstError> {
        if self.block.is_empty() {
            return Ok(());
        }
        let offset = self.data_written;
        self.file.write_all(&self.block)?;
        if let Some(first_key) = self.block_first_key.take() {
            self.index.push(first_key, offset);
        }
        self.data_written += self.block.len() as u64;
        self.block.clear();
        Ok(())
    }
}
