//! Background compaction: merge the oldest N tables, dropping tombstones.

use sstable::{MergeIterator, OrderedIterator, SstReader, SstWriter, MAX_FILE_SIZE,
    RECORD_HEADER_SIZE};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{manifest, unix_nanos, DbInner, Result};

impl DbInner {
    /// Spawns a compaction worker.
    pub(crate) fn spawn_compaction(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.track(std::thread::spawn(move || run(&inner)));
    }
}

fn run(inner: &Arc<DbInner>) {
    if let Err(e) = compact(inner) {
        tracing::error!(error = %e, "compaction failed");
    }
}

/// One compaction cycle.
///
/// Snapshots the N oldest tables (the tail of the newest-first stack),
/// merges them outside the lock into `compact-<nanos>-<seq>.sst` outputs
/// rolling at 64 MiB, then swaps the tail for the outputs, but only if the
/// tail is still exactly the snapshot; a racing compaction that got there
/// first wins and this cycle discards its outputs. Tombstones are dropped:
/// the inputs are the oldest tables, so no older table can resurrect a
/// deleted key.
fn compact(inner: &Arc<DbInner>) -> Result<()> {
    let tail: Vec<Arc<SstReader>> = {
        let state = inner.state.write();
        if state.sstables.len() < inner.compact_threshold {
            return Ok(());
        }
        let start = state.sstables.len() - inner.compact_threshold;
        state.sstables[start..].to_vec()
    };
    let old_paths: Vec<PathBuf> = tail.iter().map(|r| r.path().to_path_buf()).collect();

    let mut output_paths: Vec<PathBuf> = Vec::new();
    let new_readers = match write_merged(inner, &tail, &mut output_paths) {
        Ok(readers) => readers,
        Err(e) => {
            for path in &output_paths {
                let _ = fs::remove_file(path);
            }
            return Err(e);
        }
    };

    let swapped = {
        let mut state = inner.state.write();
        let n = tail.len();
        let len = state.sstables.len();
        let tail_intact = len >= n
            && state.sstables[len - n..]
                .iter()
                .zip(&tail)
                .all(|(current, snapshot)| Arc::ptr_eq(current, snapshot));

        if tail_intact {
            state.sstables.truncate(len - n);
            state.sstables.extend(new_readers.iter().cloned());
            let current_paths: Vec<PathBuf> = state
                .sstables
                .iter()
                .map(|r| r.path().to_path_buf())
                .collect();
            let again = state.sstables.len() >= inner.compact_threshold;
            Some((current_paths, again))
        } else {
            None
        }
    };

    let Some((current_paths, should_compact_again)) = swapped else {
        // Another worker replaced the tail while we merged; our outputs are
        // orphans.
        drop(new_readers);
        for path in &output_paths {
            let _ = fs::remove_file(path);
        }
        return Ok(());
    };

    // Old readers die with the last Arc; unlinking open files is fine here.
    drop(tail);
    for path in &old_paths {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(error = %e, path = %path.display(), "deleting compacted sstable failed");
        }
    }

    if let Err(e) = manifest::rewrite(&inner.dir, &current_paths) {
        // Stale until the next successful rewrite; restart skips the
        // missing names and ignores the unlisted outputs.
        tracing::warn!(error = %e, "manifest rewrite after compaction failed");
    }

    if should_compact_again {
        inner.spawn_compaction();
    }
    Ok(())
}

/// Streams the merged record stream into one or more output tables, rolling
/// to a fresh file whenever the current one would exceed [`MAX_FILE_SIZE`].
/// Tombstones are skipped. Pushes every created path into `output_paths` so
/// the caller can clean up on failure.
fn write_merged(
    inner: &DbInner,
    tail: &[Arc<SstReader>],
    output_paths: &mut Vec<PathBuf>,
) -> Result<Vec<Arc<SstReader>>> {
    let mut inputs = Vec::with_capacity(tail.len());
    for reader in tail {
        inputs.push(reader.iter()?);
    }
    let mut merge = MergeIterator::new(inputs)?;

    let base_nanos = unix_nanos();
    let mut readers: Vec<Arc<SstReader>> = Vec::new();
    let mut writer: Option<SstWriter> = None;

    while merge.valid() {
        if let Some(value) = merge.value() {
            let record_size = (RECORD_HEADER_SIZE + merge.key().len() + value.len()) as u64;

            let roll = writer
                .as_ref()
                .map_or(false, |w| {
                    w.data_size() > 0 && w.data_size() + record_size > MAX_FILE_SIZE
                });
            if roll {
                if let Some(full) = writer.take() {
                    let path = full.path().to_path_buf();
                    full.finish()?;
                    readers.push(Arc::new(SstReader::open(&path)?));
                }
            }

            let out = match writer.as_mut() {
                Some(out) => out,
                None => {
                    let path = inner
                        .dir
                        .join(format!("compact-{}-{}.sst", base_nanos, output_paths.len()));
                    output_paths.push(path.clone());
                    writer.insert(SstWriter::create(&path)?)
                }
            };
            out.append(merge.key(), Some(value))?;
        }
        merge.next()?;
    }

    if let Some(last) = writer.take() {
        let path = last.path().to_path_buf();
        last.finish()?;
        readers.push(Arc::new(SstReader::open(&path)?));
    }

    Ok(readers)
}
