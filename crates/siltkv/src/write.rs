//! Write path: `put()`, `delete()`, and memtable rotation.

use memtable::Memtable;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{unix_nanos, Db, DbInner, Error, Result};

impl Db {
    /// Inserts or updates a key-value pair.
    ///
    /// Bounds: key ≤ 128 B, value ≤ 4 KiB; anything larger is rejected with
    /// [`Error::InvalidArgument`] before touching disk. Never reports a
    /// missing key. May trigger a rotation when the memtable fills up.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(key, Some(value))
    }

    /// Records a deletion. Idempotent: deleting an absent key succeeds and
    /// simply writes a tombstone that shadows any older value.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(key, None)
    }

    fn write(&self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        // A failed background flush stalls rotation permanently; surface it
        // instead of letting the active memtable grow without bound.
        if let Some(msg) = self.inner.flush_error.lock().as_deref() {
            return Err(Error::background(msg));
        }

        let needs_rotation = {
            let state = self.inner.state.read();
            let active = state.active.as_ref().ok_or(Error::Closed)?;
            match value {
                Some(value) => active.put(key, value)?,
                None => active.delete(key)?,
            }
            active.is_full()
        };

        if needs_rotation {
            self.inner.rotate()?;
        }
        Ok(())
    }
}

impl DbInner {
    /// Freezes the full active memtable, parks it in the immutable slot,
    /// starts a fresh active on a new WAL, and hands the frozen one to a
    /// background flush worker.
    ///
    /// If an immutable memtable is still being flushed, rotation returns
    /// success without acting: the caller's write was already accepted, and
    /// back-pressure takes the form of the active growing past its limit
    /// until the flush completes.
    pub(crate) fn rotate(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.write();

        if state.immutable.is_some() {
            return Ok(());
        }

        let active = state.active.clone().ok_or(Error::Closed)?;
        active.freeze()?;
        let old_wal_path: PathBuf = active.wal_path().to_path_buf();

        let new_wal = self.dir.join(format!("active-{}.wal", unix_nanos()));
        let new_active = Arc::new(Memtable::open(&new_wal, self.memtable_max)?);

        state.immutable = Some(Arc::clone(&active));
        state.active = Some(new_active);
        drop(state);

        self.spawn_flush(active, old_wal_path);
        Ok(())
    }
}
