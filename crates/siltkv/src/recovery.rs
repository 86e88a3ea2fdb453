//! WAL segment discovery for the cold-start path.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::{Result, ACTIVE_WAL};

/// One WAL file found in the data directory, with the timestamp that orders
/// it against its siblings.
pub(crate) struct WalSegment {
    pub(crate) path: PathBuf,
    pub(crate) timestamp: u64,
}

/// Enumerates `*.wal` files, ordered oldest to newest.
///
/// Naming scheme: `active.wal` is the initial segment (timestamp 0);
/// `active-<unix_nanos>.wal` are rotation products carrying their timestamp
/// in the name. Anything else ending in `.wal` is still recovered, ordered
/// by file modification time. Ties break on the file name.
pub(crate) fn list_wal_segments(dir: &Path) -> Result<Vec<WalSegment>> {
    let mut segments = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".wal") || !path.is_file() {
            continue;
        }

        let timestamp = if name == ACTIVE_WAL {
            0
        } else if let Some(digits) = name
            .strip_prefix("active-")
            .and_then(|rest| rest.strip_suffix(".wal"))
        {
            digits
                .parse::<u64>()
                .unwrap_or_else(|_| modified_nanos(&path))
        } else {
            modified_nanos(&path)
        };

        segments.push(WalSegment { path, timestamp });
    }

    segments.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(segments)
}

/// Modification time in nanoseconds since the epoch; 0 when unavailable.
fn modified_nanos(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
