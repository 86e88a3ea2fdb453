//! The manifest: the on-disk list of live SSTables.
//!
//! A plain text file named `MANIFEST` in the data directory, one SSTable
//! path per line, oldest first (the in-memory stack is the reverse). Paths
//! are stored relative to the directory when possible, so a data directory
//! can be moved wholesale.
//!
//! Flushes append a single line; compaction rewrites the whole file
//! atomically (write `MANIFEST.tmp`, fsync, rename). After any successful
//! flush or compaction the manifest names exactly the tables a reader must
//! consult. The two failure modes are benign by construction: a table on
//! disk but missing from the manifest is ignored on restart, and a named
//! table missing on disk is skipped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Manifest file name inside the data directory.
pub(crate) const MANIFEST: &str = "MANIFEST";
/// Scratch file for atomic rewrites.
const MANIFEST_TMP: &str = "MANIFEST.tmp";

/// Reads the manifest, resolving relative entries against `dir`.
///
/// Returns an empty list when the file does not exist (fresh directory).
pub(crate) fn load(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let file = match File::open(dir.join(MANIFEST)) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut paths = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let path = Path::new(trimmed);
        paths.push(if path.is_absolute() {
            path.to_path_buf()
        } else {
            dir.join(path)
        });
    }
    Ok(paths)
}

/// Appends one SSTable path (newest at the end). Called after each flush.
pub(crate) fn append(dir: &Path, sst_path: &Path) -> io::Result<()> {
    let entry = sst_path.strip_prefix(dir).unwrap_or(sst_path);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(MANIFEST))?;
    writeln!(file, "{}", entry.display())
}

/// Replaces the manifest with `sst_paths` (given newest first, written
/// oldest first). Atomic: temp file, fsync, rename.
pub(crate) fn rewrite(dir: &Path, sst_paths: &[PathBuf]) -> io::Result<()> {
    let tmp_path = dir.join(MANIFEST_TMP);
    {
        let mut file = File::create(&tmp_path)?;
        for path in sst_paths.iter().rev() {
            let entry = path.strip_prefix(dir).unwrap_or(path);
            writeln!(file, "{}", entry.display())?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp_path, dir.join(MANIFEST))
}
