//! # Memtable
//!
//! The in-memory write buffer of the SiltKV storage engine: a [`SortedMap`]
//! behind a [`wal::Wal`].
//!
//! Every mutation is appended to the WAL first, then applied to the map, so
//! the memtable can always be rebuilt from its WAL after a crash. The
//! memtable tracks an approximate byte footprint; when it reaches its
//! configured maximum the engine freezes it (a one-way transition to
//! read-only) and flushes it to an SSTable in the background.
//!
//! ## Lifecycle
//!
//! ```text
//! open(wal) ──▶ mutable ──freeze()──▶ frozen ──flush──▶ dropped
//!    │                                  │
//!    └── replays existing WAL           └── reads still served
//! ```

mod sorted_map;

pub use sorted_map::{SortedMap, SortedMapIter};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use thiserror::Error;
use wal::{Wal, WalError};

/// Default maximum memtable size before the engine rotates it (4 MiB).
pub const DEFAULT_MAX_SIZE: usize = 4 << 20;

/// Errors surfaced by memtable mutations.
#[derive(Debug, Error)]
pub enum MemtableError {
    /// Write attempted on a frozen memtable. Reads are always permitted.
    #[error("memtable: frozen")]
    Frozen,

    /// The underlying WAL rejected or failed the operation.
    #[error(transparent)]
    Wal(#[from] WalError),
}

/// A [`SortedMap`] paired with its WAL and an approximate size counter.
///
/// The size counter is the sum of `key.len() + value.len()` over distinct
/// entries (tombstones count their key only); replacements adjust by delta.
/// The same rule applies during WAL recovery, so a reopened memtable reports
/// the same footprint it had before the crash.
pub struct Memtable {
    map: SortedMap,
    wal: Wal,
    wal_path: PathBuf,
    max_size: usize,
    size: AtomicI64,
    frozen: AtomicBool,
}

impl Memtable {
    /// Binds a memtable to a WAL file, replaying any existing records.
    ///
    /// Recovery statistics are logged; corrupted records were already
    /// counted and skipped by [`Wal::load`].
    pub fn open<P: AsRef<Path>>(wal_path: P, max_size: usize) -> Result<Self, MemtableError> {
        let wal_path = wal_path.as_ref().to_path_buf();
        let wal = Wal::open(&wal_path)?;

        let map = SortedMap::new();
        let mut recovered_bytes: i64 = 0;
        let stats = wal.load(|key, value| {
            recovered_bytes += entry_delta(&map, key, value);
            map.insert(key, value);
        });
        let stats = match stats {
            Ok(stats) => stats,
            Err(e) => {
                let _ = wal.close();
                return Err(e.into());
            }
        };

        if stats.recovered > 0 || stats.skipped > 0 {
            tracing::info!(
                recovered = stats.recovered,
                skipped = stats.skipped,
                path = %wal_path.display(),
                "memtable recovered from wal"
            );
        }

        Ok(Self {
            map,
            wal,
            wal_path,
            max_size,
            size: AtomicI64::new(recovered_bytes),
            frozen: AtomicBool::new(false),
        })
    }

    /// Inserts or updates a key-value pair: WAL append first, then the map.
    ///
    /// If the WAL append fails the map is left untouched, keeping the two
    /// consistent. No fsync happens here; durability comes from the WAL's
    /// background sync and the sync inside [`freeze`](Self::freeze).
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), MemtableError> {
        self.write(key, Some(value))
    }

    /// Records a deletion as a tombstone (a WAL record with an empty value).
    pub fn delete(&self, key: &[u8]) -> Result<(), MemtableError> {
        self.write(key, None)
    }

    fn write(&self, key: &[u8], value: Option<&[u8]>) -> Result<(), MemtableError> {
        if self.is_frozen() {
            return Err(MemtableError::Frozen);
        }

        self.wal.append(key, value)?;

        let delta = entry_delta(&self.map, key, value);
        self.map.insert(key, value);
        self.size.fetch_add(delta, Ordering::Relaxed);

        Ok(())
    }

    /// Tombstone-aware lookup: `None` when the key is absent, `Some(None)`
    /// for a tombstone, `Some(Some(value))` for a live entry.
    ///
    /// Only the map is consulted; the WAL exists for recovery, not reads.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.map.entry(key)
    }

    /// Marks the memtable immutable and syncs its WAL.
    ///
    /// Idempotent; only the first transition performs the sync. Subsequent
    /// `put`/`delete` return [`MemtableError::Frozen`], reads keep working.
    pub fn freeze(&self) -> Result<(), MemtableError> {
        if self
            .frozen
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.wal.sync()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Approximate byte footprint of the distinct entries.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.size.load(Ordering::Relaxed).max(0) as usize
    }

    /// True once the footprint reaches the configured maximum; the engine
    /// rotates the memtable at that point.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.approx_size() >= self.max_size
    }

    /// Number of entries, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Ordered iterator over all entries, tombstones included.
    ///
    /// The engine creates iterators only on frozen memtables, so the view
    /// is stable for the duration of a flush.
    #[must_use]
    pub fn iter(&self) -> SortedMapIter<'_> {
        self.map.iter()
    }

    /// Path of the WAL backing this memtable (deleted after a flush).
    #[must_use]
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// Closes the WAL (flush + fsync + release). Idempotent.
    pub fn close(&self) -> Result<(), MemtableError> {
        Ok(self.wal.close()?)
    }
}

impl std::fmt::Debug for Memtable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memtable")
            .field("wal_path", &self.wal_path)
            .field("entries", &self.map.len())
            .field("approx_size", &self.approx_size())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// Size-counter delta for inserting `value` under `key`: the new entry's
/// footprint minus the replaced one's, if any. Tombstones weigh their key.
fn entry_delta(map: &SortedMap, key: &[u8], value: Option<&[u8]>) -> i64 {
    let new_size = (key.len() + value.map_or(0, <[u8]>::len)) as i64;
    let old_size = map
        .entry(key)
        .map(|old| (key.len() + old.map_or(0, |v| v.len())) as i64);
    new_size - old_size.unwrap_or(0)
}
