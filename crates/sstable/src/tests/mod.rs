
use super::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes an SSTable from sorted `(key, value)` pairs, returning its path.
pub(crate) fn write_table(
    dir: &TempDir,
    name: &str,
    records: &[(&[u8], Option<&[u8]>)],
) -> PathBuf {
    let path = dir.path().join(name);
    let mut writer = SstWriter::create(&path).unwrap();
    for (key, value) in records {
        writer.append(key, *value).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// Collects every record from a reader in iteration order.
pub(crate) fn read_all(path: &Path) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
    let reader = SstReader::open(path).unwrap();
    let mut iter = reader.iter().unwrap();
    let mut out = Vec::new();
    while iter.valid() {
        out.push((iter.key().to_vec(), iter.value().map(<[u8]>::to_vec)));
        iter.next().unwrap();
    }
    out
}
