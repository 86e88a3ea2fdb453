use super::*;
use crate::manifest;
use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

// --------------------- Load & append ---------------------

#[test]
fn load_of_absent_manifest_is_empty() -> Result<()> {
    let dir = tempdir()?;
    assert!(manifest::load(dir.path())?.is_empty());
    Ok(())
}

#[test]
fn append_then_load_preserves_order_and_resolves_paths() -> Result<()> {
    let dir = tempdir()?;
    manifest::append(dir.path(), &dir.path().join("older.sst"))?;
    manifest::append(dir.path(), &dir.path().join("newer.sst"))?;

    // Oldest first on disk; entries come back resolved against the dir.
    let paths = manifest::load(dir.path())?;
    assert_eq!(
        paths,
        vec![dir.path().join("older.sst"), dir.path().join("newer.sst")]
    );
    Ok(())
}

#[test]
fn entries_are_stored_relative_to_the_directory() -> Result<()> {
    let dir = tempdir()?;
    manifest::append(dir.path(), &dir.path().join("table.sst"))?;

    let raw = fs::read_to_string(dir.path().join("MANIFEST"))?;
    assert_eq!(raw.trim(), "table.sst");
    Ok(())
}

#[test]
fn blank_lines_are_ignored() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("MANIFEST"), "a.sst\n\n  \nb.sst\n")?;

    let paths = manifest::load(dir.path())?;
    assert_eq!(paths, vec![dir.path().join("a.sst"), dir.path().join("b.sst")]);
    Ok(())
}

// --------------------- Rewrite ---------------------

#[test]
fn rewrite_reverses_the_newest_first_list() -> Result<()> {
    let dir = tempdir()?;
    // In-memory order is newest first; the file must read oldest first.
    let newest_first: Vec<PathBuf> = vec![
        dir.path().join("newest.sst"),
        dir.path().join("middle.sst"),
        dir.path().join("oldest.sst"),
    ];
    manifest::rewrite(dir.path(), &newest_first)?;

    let loaded = manifest::load(dir.path())?;
    assert_eq!(
        loaded,
        vec![
            dir.path().join("oldest.sst"),
            dir.path().join("middle.sst"),
            dir.path().join("newest.sst"),
        ]
    );
    Ok(())
}

#[test]
fn rewrite_replaces_previous_contents_and_leaves_no_tmp() -> Result<()> {
    let dir = tempdir()?;
    manifest::append(dir.path(), &dir.path().join("stale.sst"))?;

    manifest::rewrite(dir.path(), &[dir.path().join("fresh.sst")])?;

    let paths = manifest::load(dir.path())?;
    assert_eq!(paths, vec![dir.path().join("fresh.sst")]);
    assert!(!dir.path().join("MANIFEST.tmp").exists());
    Ok(())
}

// --------------------- Engine integration ---------------------

#[test]
fn flush_appends_the_new_table() -> Result<()> {
    let dir = tempdir()?;
    let db = small_db(dir.path(), 8 * 1024);

    write_bulk(&db, "fill", 8 * 1024);
    wait_for("flush", || !sst_files(dir.path()).is_empty());
    db.close()?;

    let names: Vec<String> = manifest::load(dir.path())?
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
        .collect();
    assert_eq!(names, vec!["active.sst".to_string()]);
    Ok(())
}

#[test]
fn compaction_rewrites_to_exactly_the_live_set() -> Result<()> {
    let dir = tempdir()?;
    let db = small_db(dir.path(), 8 * 1024);

    for i in 0..4 {
        write_bulk(&db, &format!("b{}", i), 8 * 1024);
        wait_for("burst flushed", || {
            db.inner.state.read().immutable.is_none()
        });
    }
    wait_for("compaction finished", || {
        let files = sst_files(dir.path());
        !files.is_empty()
            && files.iter().all(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with("compact-"))
            })
    });
    db.close()?;

    // The manifest names exactly the surviving files.
    let mut listed = manifest::load(dir.path())?;
    listed.sort();
    assert_eq!(listed, sst_files(dir.path()));
    Ok(())
}
