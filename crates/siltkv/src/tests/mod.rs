mod compaction_tests;
mod manifest_tests;

use crate::{Db, Options};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Opens a database with a small memtable so tests rotate quickly.
pub(crate) fn small_db(dir: &Path, memtable_max_bytes: usize) -> Db {
    let mut options = Options::new(dir);
    options.memtable_max_bytes = memtable_max_bytes;
    Db::open(options).expect("open database")
}

/// Polls `condition` until it holds or a generous deadline passes; flush
/// and compaction run on background threads, so tests wait, not sleep.
pub(crate) fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// All `*.sst` files in a directory, sorted by name.
pub(crate) fn sst_files(dir: &Path) -> Vec<PathBuf> {
    files_with_extension(dir, "sst")
}

/// All `*.wal` files in a directory, sorted by name.
pub(crate) fn wal_files(dir: &Path) -> Vec<PathBuf> {
    files_with_extension(dir, "wal")
}

fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |e| e == ext))
        .collect();
    files.sort();
    files
}

/// Writes keys of the form `<prefix>-<i>` with ~1 KiB values until the
/// database has grown past `bytes` of fresh data, returning the keys.
pub(crate) fn write_bulk(db: &Db, prefix: &str, bytes: usize) -> Vec<String> {
    let value = vec![b'v'; 1000];
    let mut keys = Vec::new();
    let mut written = 0usize;
    let mut i = 0usize;
    while written <= bytes {
        let key = format!("{}-{:05}", prefix, i);
        db.put(key.as_bytes(), &value).expect("bulk put");
        written += key.len() + value.len();
        keys.push(key);
        i += 1;
    }
    keys
}
