//! # SiltKV - LSM-tree storage engine
//!
//! The central orchestrator tying the [`wal`], [`memtable`], and [`sstable`]
//! crates into an embedded ordered key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                      DB                         │
//! │                                                 │
//! │ write.rs → active memtable (WAL + skip list)    │
//! │              |                                  │
//! │              |  (memtable full?)                │
//! │              v                                  │
//! │           rotate: active → immutable,           │
//! │           fresh active on a new WAL             │
//! │              |                                  │
//! │              v  background                      │
//! │ flush.rs → new SSTable + manifest append        │
//! │              |                                  │
//! │              |  (sstable count >= threshold?)   │
//! │              v  background                      │
//! │ compaction.rs → merge oldest N, drop tombstones │
//! │                                                 │
//! │ read.rs → active → immutable → SSTs newest-first│
//! │            (first hit wins, tombstones shadow)  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module          | Purpose                                            |
//! |-----------------|----------------------------------------------------|
//! | `lib.rs`        | `Db` handle, open, close, shared state             |
//! | [`recovery`]    | WAL segment discovery and ordering at open         |
//! | [`write`]       | `put()`, `delete()`, memtable rotation             |
//! | [`read`]        | `get()` across the memtables and table stack       |
//! | [`flush`]       | background memtable → SSTable worker               |
//! | [`compaction`]  | background merge of the oldest tables              |
//! | [`manifest`]    | the on-disk list of live SSTables                  |
//!
//! ## Crash safety
//!
//! Every write is appended to the active memtable's WAL before the in-memory
//! update. A WAL is deleted only after its memtable has been flushed to an
//! SSTable **and** that table was prepended to the live set. The manifest is
//! rewritten atomically (temp file + fsync + rename) after compaction. On
//! open, stray WAL segments left by a crash mid-rotation are replayed oldest
//! first and flushed synchronously, so recovery always collapses back to a
//! single active memtable.

mod compaction;
mod error;
mod flush;
mod manifest;
mod read;
mod recovery;
mod write;

pub use error::{Error, Result};

use memtable::Memtable;
use parking_lot::{Mutex, RwLock};
use sstable::SstReader;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default memtable footprint that triggers rotation (4 MiB).
pub const MEMTABLE_MAX_BYTES: usize = 4 << 20;
/// Default number of live SSTables that triggers compaction.
pub const COMPACT_THRESHOLD: usize = 4;
/// Name of the initial active WAL inside the data directory.
pub const ACTIVE_WAL: &str = "active.wal";

/// Tuning knobs for [`Db::open`]. The constants above are the defaults.
#[derive(Debug, Clone)]
pub struct Options {
    /// Data directory; created if absent.
    pub dir: PathBuf,
    /// Memtable footprint that triggers rotation.
    pub memtable_max_bytes: usize,
    /// Live-table count that triggers compaction of the oldest tables.
    /// Values below 2 are raised to 2.
    pub compact_threshold: usize,
}

impl Options {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            memtable_max_bytes: MEMTABLE_MAX_BYTES,
            compact_threshold: COMPACT_THRESHOLD,
        }
    }
}

/// Everything the controller lock protects: the two memtable slots and the
/// identity and order of the live table stack (newest first).
pub(crate) struct State {
    pub(crate) active: Option<Arc<Memtable>>,
    pub(crate) immutable: Option<Arc<Memtable>>,
    pub(crate) sstables: Vec<Arc<SstReader>>,
}

/// Shared core of a [`Db`] handle; background workers keep it alive through
/// their own `Arc`.
pub(crate) struct DbInner {
    pub(crate) dir: PathBuf,
    pub(crate) memtable_max: usize,
    pub(crate) compact_threshold: usize,
    pub(crate) state: RwLock<State>,
    /// First background-flush failure; surfaced by subsequent writes, since
    /// a stalled flush also stalls rotation.
    pub(crate) flush_error: Mutex<Option<String>>,
    /// Outstanding flush/compaction workers, joined by [`Db::close`].
    pub(crate) workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DbInner {
    /// Registers a background worker, pruning handles of finished ones.
    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        let mut workers = self.workers.lock();
        workers.retain(|h| !h.is_finished());
        workers.push(handle);
    }

    /// Joins outstanding workers until none remain. Workers can enqueue
    /// successors (flush → compaction → compaction), hence the loop.
    pub(crate) fn join_workers(&self) {
        loop {
            let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
            if workers.is_empty() {
                break;
            }
            for handle in workers {
                let _ = handle.join();
            }
        }
    }
}

/// An open SiltKV database.
///
/// All methods take `&self`; the handle can be shared across threads
/// (wrap it in an `Arc` or hand out clones of one).
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    /// Opens (or creates) a database at `options.dir`.
    ///
    /// Recovery order: load the manifest and open every named SSTable
    /// (unreadable ones are skipped with a warning); discover WAL segments;
    /// bind the newest segment as the active memtable; replay and flush any
    /// older segments synchronously, oldest first, so their data lands in
    /// SSTables before the database accepts traffic.
    pub fn open(options: Options) -> Result<Db> {
        if options.dir.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("data directory path is empty".into()));
        }
        fs::create_dir_all(&options.dir)?;

        let inner = Arc::new(DbInner {
            dir: options.dir,
            memtable_max: options.memtable_max_bytes,
            compact_threshold: options.compact_threshold.max(2),
            state: RwLock::new(State {
                active: None,
                immutable: None,
                sstables: Vec::new(),
            }),
            flush_error: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        });

        // The manifest lists live tables oldest first; in memory the stack
        // is newest first. A named table that fails to open is a recovery
        // decision, not an error: reads just won't see it.
        let mut sstables = Vec::new();
        for path in manifest::load(&inner.dir)?.iter().rev() {
            match SstReader::open(path) {
                Ok(reader) => sstables.push(Arc::new(reader)),
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "skipping unreadable sstable")
                }
            }
        }

        let mut segments = recovery::list_wal_segments(&inner.dir)?;
        let newest = segments.pop().unwrap_or_else(|| recovery::WalSegment {
            path: inner.dir.join(ACTIVE_WAL),
            timestamp: 0,
        });

        let active = Arc::new(Memtable::open(&newest.path, inner.memtable_max)?);
        {
            let mut state = inner.state.write();
            state.active = Some(active);
            state.sstables = sstables;
        }

        // A crash mid-rotation leaves older WAL segments behind. Replaying
        // oldest first and flushing synchronously preserves last-write-wins:
        // the newest segment stays live as the active memtable.
        for segment in segments {
            let mt = Arc::new(Memtable::open(&segment.path, inner.memtable_max)?);
            mt.freeze()?;
            inner.state.write().immutable = Some(Arc::clone(&mt));
            flush::run(&inner, mt, segment.path);
        }

        Ok(Db { inner })
    }

    /// Number of live SSTables.
    #[must_use]
    pub fn sstable_count(&self) -> usize {
        self.inner.state.read().sstables.len()
    }

    /// Closes the database: joins outstanding background workers, then
    /// closes the memtables and releases the table readers, preserving the
    /// first error. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.join_workers();

        let (active, immutable, sstables) = {
            let mut state = self.inner.state.write();
            (
                state.active.take(),
                state.immutable.take(),
                std::mem::take(&mut state.sstables),
            )
        };

        let mut first_error: Option<Error> = None;
        if let Some(mt) = active {
            if let Err(e) = mt.close() {
                first_error.get_or_insert(e.into());
            }
        }
        if let Some(mt) = immutable {
            if let Err(e) = mt.close() {
                first_error.get_or_insert(e.into());
            }
        }
        // Table readers release their file handles on drop.
        drop(sstables);

        // A rotation racing with close may have spawned a worker between the
        // first drain and the state teardown; catch it too.
        self.inner.join_workers();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Db")
            .field("dir", &self.inner.dir)
            .field("closed", &state.active.is_none())
            .field("immutable_pending", &state.immutable.is_some())
            .field("sstables", &state.sstables.len())
            .finish()
    }
}

/// Wall-clock nanoseconds since the epoch; used to name rotated WALs and
/// compaction outputs so their order is recoverable from the directory.
pub(crate) fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests;
