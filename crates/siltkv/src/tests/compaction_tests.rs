use super::*;
use anyhow::Result;
use sstable::{OrderedIterator, SstReader};
use std::path::Path;
use tempfile::tempdir;

/// Writes one burst large enough to rotate, then waits until its flush has
/// landed and the immutable slot is free again.
fn burst(db: &Db, dir: &Path, prefix: &str, expected_tables: usize) -> Vec<String> {
    let keys = write_bulk(db, prefix, 8 * 1024);
    wait_for("burst flushed", || {
        sst_files(dir).len() >= expected_tables || compact_outputs(dir).len() > 0
    });
    wait_for("immutable cleared", || {
        db.inner.state.read().immutable.is_none()
    });
    keys
}

fn compact_outputs(dir: &Path) -> Vec<std::path::PathBuf> {
    sst_files(dir)
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("compact-"))
        })
        .collect()
}

/// True if any record in the table carries `key`.
fn table_contains_key(path: &Path, key: &[u8]) -> bool {
    let reader = SstReader::open(path).expect("open sstable");
    let mut iter = reader.iter().expect("iterate sstable");
    while iter.valid() {
        if iter.key() == key {
            return true;
        }
        iter.next().expect("advance");
    }
    false
}

// --------------------- Flush (S4) ---------------------

#[test]
fn flush_writes_a_table_and_deletes_the_wal() -> Result<()> {
    let dir = tempdir()?;
    let db = small_db(dir.path(), 8 * 1024);

    let keys = write_bulk(&db, "flush", 8 * 1024);
    wait_for("sstable appears", || !sst_files(dir.path()).is_empty());
    wait_for("initial wal deleted", || {
        !dir.path().join(crate::ACTIVE_WAL).exists()
    });

    let first = &keys[0];
    let middle = &keys[keys.len() / 2];
    let last = &keys[keys.len() - 1];
    for key in [first, middle, last] {
        assert_eq!(db.get(key.as_bytes())?, Some(vec![b'v'; 1000]), "{}", key);
    }

    db.close()?;
    Ok(())
}

// --------------------- Compaction trigger ---------------------

#[test]
fn four_tables_trigger_compaction() -> Result<()> {
    let dir = tempdir()?;
    let db = small_db(dir.path(), 8 * 1024);

    let mut all_keys = Vec::new();
    for i in 0..4 {
        all_keys.extend(burst(&db, dir.path(), &format!("b{}", i), i + 1));
    }

    // Threshold reached: the four tables merge into compaction outputs.
    wait_for("compaction output", || !compact_outputs(dir.path()).is_empty());
    wait_for("old tables deleted", || {
        sst_files(dir.path()) == compact_outputs(dir.path())
    });

    for key in &all_keys {
        assert_eq!(
            db.get(key.as_bytes())?,
            Some(vec![b'v'; 1000]),
            "{} lost in compaction",
            key
        );
    }

    db.close()?;
    Ok(())
}

#[test]
fn compaction_drops_tombstones_from_oldest_tables() -> Result<()> {
    let dir = tempdir()?;
    let db = small_db(dir.path(), 8 * 1024);

    // Burst 1 plants "x"; burst 3 deletes it; both records end up in
    // flushed tables before compaction runs.
    db.put(b"x", b"1")?;
    burst(&db, dir.path(), "b0", 1);

    burst(&db, dir.path(), "b1", 2);

    db.delete(b"x")?;
    burst(&db, dir.path(), "b2", 3);

    burst(&db, dir.path(), "b3", 4);

    wait_for("compaction output", || !compact_outputs(dir.path()).is_empty());
    wait_for("old tables deleted", || {
        sst_files(dir.path()) == compact_outputs(dir.path())
    });

    // The deletion holds...
    assert_eq!(db.get(b"x")?, None);
    // ...and the merged tables carry no trace of the key at all: with the
    // oldest tables compacted together, the tombstone had nothing left to
    // shadow and was dropped.
    for output in compact_outputs(dir.path()) {
        assert!(
            !table_contains_key(&output, b"x"),
            "{} still contains the deleted key",
            output.display()
        );
    }

    db.close()?;
    Ok(())
}

#[test]
fn compaction_keeps_the_newest_version() -> Result<()> {
    let dir = tempdir()?;
    let db = small_db(dir.path(), 8 * 1024);

    for i in 0..4 {
        db.put(b"evolving", format!("gen{}", i).as_bytes())?;
        burst(&db, dir.path(), &format!("b{}", i), i + 1);
    }

    wait_for("compaction output", || !compact_outputs(dir.path()).is_empty());

    assert_eq!(db.get(b"evolving")?, Some(b"gen3".to_vec()));

    db.close()?;
    Ok(())
}

#[test]
fn compaction_survives_restart() -> Result<()> {
    let dir = tempdir()?;
    let all_keys;
    {
        let db = small_db(dir.path(), 8 * 1024);
        let mut keys = Vec::new();
        for i in 0..4 {
            keys.extend(burst(&db, dir.path(), &format!("b{}", i), i + 1));
        }
        wait_for("compaction output", || !compact_outputs(dir.path()).is_empty());
        db.close()?;
        all_keys = keys;
    }

    let db = small_db(dir.path(), 8 * 1024);
    for key in &all_keys {
        assert_eq!(
            db.get(key.as_bytes())?,
            Some(vec![b'v'; 1000]),
            "{} lost after restart",
            key
        );
    }
    db.close()?;
    Ok(())
}

// --------------------- Close joins workers ---------------------

#[test]
fn close_waits_for_background_workers() -> Result<()> {
    let dir = tempdir()?;
    let db = small_db(dir.path(), 8 * 1024);

    // Rotate and close immediately: close must join the in-flight flush,
    // so afterwards the table exists and the flushed WAL is gone.
    write_bulk(&db, "racing", 8 * 1024);
    db.close()?;

    assert!(!sst_files(dir.path()).is_empty());
    assert!(!dir.path().join(crate::ACTIVE_WAL).exists());
    Ok(())
}
