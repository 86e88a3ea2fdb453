//! SSTable reader: footer-validated point lookups and sequential iteration.

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bloom::BloomFilter;

use crate::format::{
    BlockIndex, Footer, FOOTER_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE, RECORD_HEADER_SIZE,
};
use crate::{OrderedIterator, SstError};

/// Read-only handle on one SSTable file.
///
/// On open, the trailing footer is validated and the block index and bloom
/// filter are loaded into memory. If footer validation fails the reader
/// enters **legacy mode**: the whole file is treated as a flat record
/// sequence with neither index nor bloom filter, and `get` degrades to a
/// linear scan with early termination.
///
/// The file handle is kept open behind a mutex so lookups through a shared
/// `&self` need one seek + read, without reopening the file.
pub struct SstReader {
    path: PathBuf,
    file: Mutex<File>,
    file_size: u64,
    /// End of the data section: the index offset, or the file size in
    /// legacy mode.
    data_end: u64,
    /// Sparse index; `None` in legacy mode.
    index: Option<BlockIndex>,
    /// Bloom filter; `None` in legacy mode.
    bloom: Option<BloomFilter>,
}

impl SstReader {
    /// Opens an SSTable and loads its metadata.
    ///
    /// Only I/O failures are errors; a missing or invalid footer silently
    /// selects legacy mode, and corruption *inside* a validated footer's
    /// index or bloom slices is reported as [`SstError::Corruption`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SstError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        let footer = Self::read_footer(&mut file, file_size);
        let Some(footer) = footer.filter(|f| Self::offsets_plausible(f, file_size)) else {
            return Ok(Self {
                path,
                file: Mutex::new(file),
                file_size,
                data_end: file_size,
                index: None,
                bloom: None,
            });
        };

        // Block index slice: [index_offset, index_offset + index_size)
        file.seek(SeekFrom::Start(footer.index_offset))?;
        let mut index_bytes = vec![0u8; footer.index_size as usize];
        file.read_exact(&mut index_bytes)?;
        let index = BlockIndex::deserialize(&index_bytes)?;

        // Bloom slice: [bloom_offset, footer)
        let bloom_len = (file_size - FOOTER_SIZE as u64 - footer.bloom_offset) as usize;
        file.seek(SeekFrom::Start(footer.bloom_offset))?;
        let mut bloom_bytes = vec![0u8; bloom_len];
        file.read_exact(&mut bloom_bytes)?;
        let bloom = BloomFilter::from_bytes(&bloom_bytes)
            .ok_or_else(|| SstError::Corruption("bloom filter truncated".into()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            file_size,
            data_end: footer.index_offset,
            index: Some(index),
            bloom: Some(bloom),
        })
    }

    fn read_footer(file: &mut File, file_size: u64) -> Option<Footer> {
        if file_size < FOOTER_SIZE as u64 {
            return None;
        }
        let mut buf = [0u8; FOOTER_SIZE];
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64))).ok()?;
        file.read_exact(&mut buf).ok()?;
        Footer::deserialize(&buf).ok()
    }

    /// All three footer offsets must carve non-overlapping sections inside
    /// the file: data, index, bloom, footer, in that order.
    fn offsets_plausible(footer: &Footer, file_size: u64) -> bool {
        let footer_start = file_size - FOOTER_SIZE as u64;
        footer.index_offset <= footer.bloom_offset
            && footer
                .index_offset
                .checked_add(footer.index_size)
                .map_or(false, |end| end <= footer.bloom_offset)
            && footer.bloom_offset <= footer_start
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the footer failed validation and the reader linear-scans.
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.index.is_none()
    }

    /// Point lookup.
    ///
    /// Returns `None` when the key is not in this table, `Some(None)` for a
    /// tombstone, `Some(Some(value))` for a live record (an owned copy).
    pub fn get(&self, key: &[u8]) -> Result<Option<Option<Vec<u8>>>, SstError> {
        let Some(index) = self.index.as_ref() else {
            return self.scan_get(key);
        };

        // A negative bloom answer is definitive.
        if let Some(bloom) = self.bloom.as_ref() {
            if !bloom.may_contain(key) {
                return Ok(None);
            }
        }

        let Some(pos) = index.find_block(key) else {
            return Ok(None);
        };
        let start = index.entries[pos].offset;
        let end = index
            .entries
            .get(pos + 1)
            .map_or(self.data_end, |next| next.offset);

        let mut block = vec![0u8; (end - start) as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(&mut block)?;
        }

        Self::scan_block(&block, key)
    }

    /// Scans one decoded block for `key`, stopping early once a larger key
    /// is seen (records are sorted).
    fn scan_block(block: &[u8], key: &[u8]) -> Result<Option<Option<Vec<u8>>>, SstError> {
        let mut pos = 0usize;
        while pos + RECORD_HEADER_SIZE <= block.len() {
            let ksize = LittleEndian::read_u32(&block[pos..pos + 4]) as usize;
            let vsize = LittleEndian::read_u32(&block[pos + 4..pos + 8]) as usize;
            if ksize > MAX_KEY_SIZE || vsize > MAX_VALUE_SIZE {
                return Err(SstError::Corruption(format!(
                    "record length out of bounds (key {}, value {})",
                    ksize, vsize
                )));
            }
            let body_start = pos + RECORD_HEADER_SIZE;
            let body_end = body_start + ksize + vsize;
            if body_end > block.len() {
                return Err(SstError::Corruption("record overruns block".into()));
            }

            let record_key = &block[body_start..body_start + ksize];
            match record_key.cmp(key) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal => {
                    let value = if vsize == 0 {
                        None
                    } else {
                        Some(block[body_start + ksize..body_end].to_vec())
                    };
                    return Ok(Some(value));
                }
                std::cmp::Ordering::Greater => return Ok(None),
            }
            pos = body_end;
        }
        Ok(None)
    }

    /// Legacy-mode lookup: linear scan of the whole file with early
    /// termination once the current key exceeds the target.
    fn scan_get(&self, key: &[u8]) -> Result<Option<Option<Vec<u8>>>, SstError> {
        let mut iter = self.iter()?;
        while iter.valid() {
            match iter.key().cmp(key) {
                std::cmp::Ordering::Less => iter.next()?,
                std::cmp::Ordering::Equal => {
                    return Ok(Some(iter.value().map(<[u8]>::to_vec)));
                }
                std::cmp::Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Sequential iterator over the data section, positioned on the first
    /// record. Yields tombstones.
    pub fn iter(&self) -> Result<SstIter<'_>, SstError> {
        let mut iter = SstIter {
            reader: self,
            pos: 0,
            current: None,
        };
        iter.next()?;
        Ok(iter)
    }
}

impl std::fmt::Debug for SstReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SstReader")
            .field("path", &self.path)
            .field("file_size", &self.file_size)
            .field("blocks", &self.index.as_ref().map(BlockIndex::len))
            .field("legacy", &self.is_legacy())
            .finish()
    }
}

/// Forward iterator over an SSTable's records.
///
/// Becomes invalid at the end of the data section, on a short read, or on a
/// malformed length; only genuine I/O failures surface as errors.
pub struct SstIter<'a> {
    reader: &'a SstReader,
    pos: u64,
    current: Option<(Vec<u8>, Option<Vec<u8>>)>,
}

impl OrderedIterator for SstIter<'_> {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[], |(k, _)| k.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().and_then(|(_, v)| v.as_deref())
    }

    fn next(&mut self) -> Result<(), SstError> {
        self.current = None;

        let data_end = self.reader.data_end;
        if self.pos + RECORD_HEADER_SIZE as u64 > data_end {
            return Ok(());
        }

        let mut header = [0u8; RECORD_HEADER_SIZE];
        let mut body;
        {
            let mut file = self.reader.file.lock();
            file.seek(SeekFrom::Start(self.pos))?;
            if read_exact_or_eof(&mut *file, &mut header)?.is_none() {
                return Ok(());
            }

            let ksize = LittleEndian::read_u32(&header[0..4]) as usize;
            let vsize = LittleEndian::read_u32(&header[4..8]) as usize;
            if ksize > MAX_KEY_SIZE || vsize > MAX_VALUE_SIZE {
                return Ok(());
            }
            let record_end = self.pos + (RECORD_HEADER_SIZE + ksize + vsize) as u64;
            if record_end > data_end {
                return Ok(());
            }

            body = vec![0u8; ksize + vsize];
            if read_exact_or_eof(&mut *file, &mut body)?.is_none() {
                return Ok(());
            }

            let value = if vsize == 0 {
                None
            } else {
                Some(body.split_off(ksize))
            };
            self.current = Some((body, value));
            self.pos = record_end;
        }
        Ok(())
    }
}

/// `read_exact` that reports a short read as `None` instead of an error.
fn read_exact_or_eof(file: &mut File, buf: &mut [u8]) -> Result<Option<()>, SstError> {
    match file.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(SstError::Io(e)),
    }
}
