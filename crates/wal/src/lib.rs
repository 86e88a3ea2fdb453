//! # WAL - Write-Ahead Log
//!
//! Provides crash-safe durability for the SiltKV storage engine.
//!
//! Every mutation (`PUT` or `DELETE`) is serialized into a binary record and
//! appended to the WAL **before** the corresponding in-memory update. On
//! restart the WAL is replayed to reconstruct the memtable, guaranteeing that
//! no acknowledged write older than the last durable sync point is lost.
//!
//! ## Binary Record Format
//!
//! ```text
//! [checksum: u32 LE][key_len: u32 LE][val_len: u32 LE][key][value]
//! ```
//!
//! `checksum` is CRC32 (IEEE) over `key_len || val_len || key || value`.
//! `val_len == 0` marks a tombstone (deletion).
//!
//! ## Durability model
//!
//! Appends land in an in-process batch buffer of up to 64 KiB; the buffer is
//! written to the OS when full. A background thread flushes the buffer and
//! fsyncs the file once per second, so an acknowledged write becomes durable
//! within one sync interval at the latest. [`Wal::sync`] forces the same on
//! demand, and [`Wal::close`] flushes and syncs before releasing the file.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::Wal;
//!
//! let wal = Wal::open("active.wal").unwrap();
//! wal.append(b"hello", Some(b"world")).unwrap();
//! wal.append(b"hello", None).unwrap(); // tombstone
//! wal.close().unwrap();
//! ```

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// Maximum allowed key size (128 B, tuned for web workloads).
pub const MAX_KEY_SIZE: usize = 128;
/// Maximum allowed value size (4 KiB, compressed JSON payload).
pub const MAX_VALUE_SIZE: usize = 4 * 1024;
/// Fixed size of the record header: checksum + key_len + val_len.
pub const HEADER_SIZE: usize = 12;
/// Batch buffer size that forces a write to the OS page cache (64 KiB).
pub const BATCH_CAPACITY: usize = 64 << 10;
/// Interval of the background flush-and-fsync thread.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Initial capacity of the reusable per-record scratch buffer.
const INITIAL_SCRATCH_CAPACITY: usize = 512;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Operation attempted after [`Wal::close`].
    #[error("wal: writer is closed")]
    Closed,

    /// Key or value exceeds its size bound.
    #[error("wal: invalid key or value size")]
    InvalidSize,

    /// An underlying I/O error, possibly latched from the background sync.
    #[error("wal: io error: {0}")]
    Io(#[from] io::Error),
}

/// Statistics reported by [`Wal::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Number of records successfully recovered.
    pub recovered: usize,
    /// Number of corrupted or truncated records skipped.
    pub skipped: usize,
}

/// State shared between client calls and the background sync thread.
///
/// One mutex protects the file handle, the batch buffer, and the latched
/// background error. Only the file write happens while the lock is held;
/// the fsync itself runs on a cloned handle outside the lock.
struct Inner {
    file: Option<File>,
    /// Reusable buffer for encoding a single record.
    scratch: Vec<u8>,
    /// Batched encoded records not yet written to the OS.
    batch: Vec<u8>,
    /// Background fsync error, surfaced by the next append/sync.
    async_error: Option<(io::ErrorKind, String)>,
    closed: bool,
}

impl Inner {
    /// Writes the batch buffer to the OS page cache. No-op when empty or
    /// when the file is already released.
    fn flush_batch(&mut self) -> io::Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(&self.batch)?;
            self.batch.clear();
        }
        Ok(())
    }

    fn latched_error(&self) -> Option<WalError> {
        self.async_error
            .as_ref()
            .map(|(kind, msg)| WalError::Io(io::Error::new(*kind, msg.clone())))
    }
}

/// Append-only write-ahead log bound to a single file.
///
/// All methods take `&self`; the shared state lives behind a mutex so a
/// memtable can expose the WAL to concurrent writers and to the background
/// sync thread at the same time.
pub struct Wal {
    path: PathBuf,
    inner: Arc<Mutex<Inner>>,
    /// Dropping the sender wakes and terminates the sync thread.
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    sync_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Wal {
    /// Opens (or creates) a WAL file in append mode and starts the 1 Hz
    /// background sync thread.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let inner = Arc::new(Mutex::new(Inner {
            file: Some(file),
            scratch: Vec::with_capacity(INITIAL_SCRATCH_CAPACITY),
            batch: Vec::with_capacity(BATCH_CAPACITY),
            async_error: None,
            closed: false,
        }));

        let (stop_tx, stop_rx) = mpsc::channel();
        let thread_inner = Arc::clone(&inner);
        let handle = std::thread::spawn(move || sync_loop(thread_inner, stop_rx));

        Ok(Self {
            path,
            inner,
            stop_tx: Mutex::new(Some(stop_tx)),
            sync_thread: Mutex::new(Some(handle)),
        })
    }

    /// Returns the path this WAL is bound to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes a record and appends it to the log.
    ///
    /// `value == None` writes a tombstone (`val_len == 0`). The record is
    /// ordered after all prior successful appends. Fails fast with
    /// [`WalError::InvalidSize`] before any I/O when a size bound is
    /// exceeded, with [`WalError::Closed`] after close, and with the latched
    /// background error if the sync thread hit one.
    pub fn append(&self, key: &[u8], value: Option<&[u8]>) -> Result<(), WalError> {
        let ksize = key.len();
        let vsize = value.map_or(0, <[u8]>::len);

        // Validate before any allocation or I/O; a record that can't be
        // recovered must not be acknowledged.
        if ksize > MAX_KEY_SIZE || vsize > MAX_VALUE_SIZE {
            return Err(WalError::InvalidSize);
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.closed || inner.file.is_none() {
            return Err(WalError::Closed);
        }
        if let Some(err) = inner.latched_error() {
            return Err(err);
        }

        // Encode header + payload into the reusable scratch buffer.
        let needed = HEADER_SIZE + ksize + vsize;
        inner.scratch.clear();
        inner.scratch.resize(HEADER_SIZE, 0);
        LittleEndian::write_u32(&mut inner.scratch[4..8], ksize as u32);
        LittleEndian::write_u32(&mut inner.scratch[8..12], vsize as u32);
        inner.scratch.extend_from_slice(key);
        if let Some(value) = value {
            inner.scratch.extend_from_slice(value);
        }
        debug_assert_eq!(inner.scratch.len(), needed);

        let mut hasher = Crc32::new();
        hasher.update(&inner.scratch[4..]);
        let sum = hasher.finalize();
        LittleEndian::write_u32(&mut inner.scratch[0..4], sum);

        inner.batch.extend_from_slice(&inner.scratch);

        // Drain to the OS page cache once the batch is large enough.
        if inner.batch.len() >= BATCH_CAPACITY {
            inner.flush_batch()?;
        }

        Ok(())
    }

    /// Flushes the batch buffer and fsyncs the file.
    ///
    /// The file write only reaches the kernel page cache; this forces the
    /// cached data onto disk. Allowed to block.
    pub fn sync(&self) -> Result<(), WalError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.closed {
            return Err(WalError::Closed);
        }
        if let Some(err) = inner.latched_error() {
            return Err(err);
        }

        inner.flush_batch()?;
        match inner.file.as_ref() {
            Some(file) => file.sync_all()?,
            None => return Err(WalError::Closed),
        }
        Ok(())
    }

    /// Replays the log from the start, invoking `apply(key, value)` once per
    /// valid record. `value` is `None` for tombstones.
    ///
    /// Recovery is tolerant: a record with an out-of-bounds length, a short
    /// body, or a checksum mismatch is counted in [`LoadStats::skipped`]. A
    /// checksum mismatch alone does not stop recovery (the record boundary is
    /// still known); anything that loses the boundary (a short header or a
    /// short body) ends recovery cleanly with every prior valid record
    /// applied, treating the file as truncated there.
    pub fn load<F>(&self, mut apply: F) -> Result<LoadStats, WalError>
    where
        F: FnMut(&[u8], Option<&[u8]>),
    {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let file = match inner.file.as_mut() {
            Some(file) => file,
            None => return Err(WalError::Closed),
        };

        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);

        let mut stats = LoadStats::default();
        let mut header = [0u8; HEADER_SIZE];
        let mut data = Vec::with_capacity(1024);

        loop {
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                // Clean EOF or a torn header: the valid prefix is recovered.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            }

            let expect_sum = LittleEndian::read_u32(&header[0..4]);
            let ksize = LittleEndian::read_u32(&header[4..8]) as usize;
            let vsize = LittleEndian::read_u32(&header[8..12]) as usize;

            // An out-of-bounds length means the record boundary is lost;
            // stop here rather than misparse the rest of the file.
            if ksize > MAX_KEY_SIZE || vsize > MAX_VALUE_SIZE {
                stats.skipped += 1;
                break;
            }

            data.clear();
            data.resize(ksize + vsize, 0);
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    // Torn record at the tail.
                    stats.skipped += 1;
                    break;
                }
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Crc32::new();
            hasher.update(&header[4..]);
            hasher.update(&data);
            if hasher.finalize() != expect_sum {
                // The boundary is intact, so recovery can continue with the
                // next record.
                stats.skipped += 1;
                continue;
            }

            let (key, value) = data.split_at(ksize);
            if vsize == 0 {
                apply(key, None);
            } else {
                apply(key, Some(value));
            }
            stats.recovered += 1;
        }

        Ok(stats)
    }

    /// Flushes, fsyncs, and releases the file; stops the background sync
    /// thread. Idempotent: repeated calls return `Ok`.
    pub fn close(&self) -> Result<(), WalError> {
        // Stop the sync thread first so it cannot race the final flush.
        if let Some(tx) = self.stop_tx.lock().take() {
            drop(tx);
        }
        if let Some(handle) = self.sync_thread.lock().take() {
            let _ = handle.join();
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.closed && inner.file.is_none() {
            return Ok(());
        }
        inner.closed = true;

        let flush_result = inner.flush_batch();
        let file = inner.file.take();
        drop(guard);

        flush_result?;
        if let Some(file) = file {
            file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for Wal {
    /// Stops the sync thread. Deliberately performs no final flush: dropping
    /// an unclosed WAL is the crash path, and data still in the batch buffer
    /// is exactly what a crash would lose.
    fn drop(&mut self) {
        self.stop_tx.get_mut().take();
        if let Some(handle) = self.sync_thread.get_mut().take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal").field("path", &self.path).finish()
    }
}

/// Body of the background sync thread.
///
/// Once per [`SYNC_INTERVAL`]: flush the batch under the lock, clone the
/// file handle, release the lock, fsync. Errors are latched into
/// `async_error` and returned by the next client call. Exits when the stop
/// channel is signalled or dropped, or when the WAL closes.
fn sync_loop(inner: Arc<Mutex<Inner>>, stop_rx: mpsc::Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(SYNC_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let file = {
            let mut guard = inner.lock();
            let inner = &mut *guard;

            if inner.closed || inner.file.is_none() {
                return;
            }
            if inner.async_error.is_some() {
                continue;
            }

            if let Err(e) = inner.flush_batch() {
                tracing::error!(error = %e, "wal background flush failed");
                inner.async_error = Some((e.kind(), e.to_string()));
                continue;
            }

            match inner.file.as_ref().map(File::try_clone) {
                Some(Ok(file)) => file,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "wal file clone for sync failed");
                    inner.async_error = Some((e.kind(), e.to_string()));
                    continue;
                }
                None => return,
            }
        };

        // fsync outside the lock so appends are not blocked behind the disk.
        if let Err(e) = file.sync_all() {
            tracing::error!(error = %e, "wal background fsync failed");
            let mut guard = inner.lock();
            if guard.async_error.is_none() {
                guard.async_error = Some((e.kind(), e.to_string()));
            }
        }
    }
}
