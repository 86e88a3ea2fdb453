//! Background flush: immutable memtable → SSTable.

use memtable::Memtable;
use sstable::{SstReader, SstWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{manifest, DbInner, Result};

impl DbInner {
    /// Spawns a flush worker for a frozen memtable and its WAL.
    pub(crate) fn spawn_flush(self: &Arc<Self>, mt: Arc<Memtable>, old_wal_path: PathBuf) {
        let inner = Arc::clone(self);
        self.track(std::thread::spawn(move || run(&inner, mt, old_wal_path)));
    }
}

/// Worker entry point; also called synchronously while recovering stray WAL
/// segments at open.
///
/// A failure is latched onto the database: the immutable slot stays
/// occupied, which stalls every further rotation, and subsequent writes
/// report the error instead of silently growing the active memtable.
pub(crate) fn run(inner: &Arc<DbInner>, mt: Arc<Memtable>, old_wal_path: PathBuf) {
    if let Err(e) = flush_memtable(inner, &mt, &old_wal_path) {
        tracing::error!(
            error = %e,
            wal = %old_wal_path.display(),
            "flush failed; rotation is stalled until the database is reopened"
        );
        let mut latched = inner.flush_error.lock();
        if latched.is_none() {
            *latched = Some(e.to_string());
        }
    }
}

/// The flush sequence:
///
/// 1. Derive the table path from the WAL path (`.wal` → `.sst`).
/// 2. Stream the memtable's ordered entries, tombstones included, into a
///    new SSTable and open a reader on it.
/// 3. Under the controller lock: prepend the reader (newest first), clear
///    the immutable slot, decide whether compaction is due.
/// 4. Outside the lock: append the table to the manifest, close the
///    memtable, delete its WAL. These three are logged-but-ignored on
///    failure; restart recovers from each.
/// 5. Kick off compaction if the table count reached the threshold.
fn flush_memtable(inner: &Arc<DbInner>, mt: &Arc<Memtable>, old_wal_path: &Path) -> Result<()> {
    let sst_path = old_wal_path.with_extension("sst");

    let mut writer = SstWriter::create(&sst_path)?;
    let mut entries = mt.iter();
    writer.append_from_iterator(&mut entries)?;
    writer.finish()?;

    let reader = Arc::new(SstReader::open(&sst_path)?);

    let should_compact = {
        let mut state = inner.state.write();
        state.sstables.insert(0, reader);
        if state
            .immutable
            .as_ref()
            .map_or(false, |imm| Arc::ptr_eq(imm, mt))
        {
            state.immutable = None;
        }
        state.sstables.len() >= inner.compact_threshold
    };

    if let Err(e) = manifest::append(&inner.dir, &sst_path) {
        // The table still serves reads from memory; a restart will skip it
        // until the next successful manifest rewrite.
        tracing::warn!(error = %e, sst = %sst_path.display(), "manifest append failed");
    }

    if let Err(e) = mt.close() {
        tracing::warn!(error = %e, "closing flushed memtable failed");
    }

    // The table now owns this data; the WAL is redundant.
    if let Err(e) = std::fs::remove_file(old_wal_path) {
        tracing::warn!(error = %e, wal = %old_wal_path.display(), "deleting flushed wal failed");
    }

    if should_compact {
        inner.spawn_compaction();
    }
    Ok(())
}
