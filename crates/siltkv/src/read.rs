//! Read path: `get()` across the memtables and the table stack.

use crate::{Db, Result};

impl Db {
    /// Looks up a key, returning an owned copy of its value, or `Ok(None)`
    /// when the key is not present.
    ///
    /// Lookup order: active memtable → immutable memtable → SSTables newest
    /// first. The first container that knows the key ends the search; if
    /// what it knows is a tombstone, the answer is "not present". A
    /// container that has never seen the key is transparent and the search
    /// continues. A lookup never fails for a missing key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        // Snapshot under the read lock, then do all I/O outside it.
        let (active, immutable, sstables) = {
            let state = self.inner.state.read();
            (
                state.active.clone(),
                state.immutable.clone(),
                state.sstables.clone(),
            )
        };

        if let Some(mt) = active {
            if let Some(entry) = mt.get(key) {
                return Ok(entry);
            }
        }
        if let Some(mt) = immutable {
            if let Some(entry) = mt.get(key) {
                return Ok(entry);
            }
        }

        for table in &sstables {
            match table.get(key) {
                Ok(Some(entry)) => return Ok(entry),
                Ok(None) => continue,
                Err(e) => {
                    // A damaged table must not fail reads that an older
                    // table can still answer.
                    tracing::warn!(
                        error = %e,
                        path = %table.path().display(),
                        "sstable read failed, continuing with older tables"
                    );
                    continue;
                }
            }
        }

        Ok(None)
    }
}
