use super::helpers::{flush_run, open_test_db, RecordingListener};
use crate::{Db, DbOptions, EngineError};
use std::sync::Arc;
use tempfile::tempdir;

// --------------------- Put / Get ---------------------

#[test]
fn put_then_get_from_memtable() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());

    db.put(b"name".to_vec(), b"fluid".to_vec()).unwrap();
    assert_eq!(db.get(b"name").unwrap(), Some(b"fluid".to_vec()));
    assert_eq!(db.get(b"missing").unwrap(), None);
}

#[test]
fn get_reads_through_flushed_runs() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());

    flush_run(&db, "a", 20);
    flush_run(&db, "b", 20);

    assert_eq!(
        db.get(b"a0007").unwrap(),
        Some(b"value-a7".to_vec()),
        "key from first run"
    );
    assert_eq!(
        db.get(b"b0013").unwrap(),
        Some(b"value-b13".to_vec()),
        "key from second run"
    );
    assert_eq!(db.get(b"c0000").unwrap(), None);
}

#[test]
fn overwrite_newest_value_wins_across_runs() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());

    db.put(b"k".to_vec(), b"v1".to_vec()).unwrap();
    db.flush().unwrap();
    db.put(b"k".to_vec(), b"v2".to_vec()).unwrap();
    db.flush().unwrap();

    assert_eq!(db.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn rejects_empty_and_oversized_keys() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());

    assert!(matches!(
        db.put(Vec::new(), b"v".to_vec()),
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.put(vec![b'k'; crate::MAX_KEY_SIZE + 1], b"v".to_vec()),
        Err(EngineError::InvalidArgument(_))
    ));
}

// --------------------- Flush behavior ---------------------

#[test]
fn flush_of_empty_memtable_is_noop() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());

    db.flush().unwrap();
    let meta = db.column_family_metadata();
    assert!(meta.levels[0].files.is_empty());
}

#[test]
fn write_buffer_threshold_triggers_automatic_flush() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());
    db.set_write_buffer_size(256);

    for i in 0..32u32 {
        db.put(
            format!("key{i:04}").into_bytes(),
            vec![b'v'; 32],
        )
        .unwrap();
    }

    let meta = db.column_family_metadata();
    assert!(
        !meta.levels[0].files.is_empty(),
        "threshold crossings should have produced L0 files"
    );
}

#[test]
fn l0_files_are_newest_first() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());

    flush_run(&db, "a", 5);
    flush_run(&db, "b", 5);

    let meta = db.column_family_metadata();
    let names: Vec<_> = meta.levels[0].files.iter().map(|f| f.name.clone()).collect();
    assert_eq!(names.len(), 2);
    assert!(
        names[0] > names[1],
        "newest file (higher number) should come first: {:?}",
        names
    );
}

#[test]
fn flush_events_carry_backpressure_flags() {
    let dir = tempdir().unwrap();
    let listener = Arc::new(RecordingListener::default());
    let opts = DbOptions {
        num_levels: 8,
        level0_slowdown_writes_trigger: 2,
        level0_stop_writes_trigger: 3,
        listeners: vec![listener.clone() as Arc<dyn crate::EventListener>],
        ..Default::default()
    };
    let db = Db::open(opts, dir.path().join("db")).unwrap();

    for run in 0..3 {
        flush_run(&db, &format!("r{run}"), 3);
    }

    let flushes = listener.flushes.lock();
    assert_eq!(flushes.len(), 3);
    assert!(!flushes[0].triggered_writes_slowdown, "1 L0 file: no slowdown");
    assert!(flushes[1].triggered_writes_slowdown, "2 L0 files: slowdown");
    assert!(!flushes[1].triggered_writes_stop);
    assert!(flushes[2].triggered_writes_stop, "3 L0 files: stop");
}

// --------------------- Metadata ---------------------

#[test]
fn metadata_reports_sizes_ranges_and_counts() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());

    flush_run(&db, "m", 10);

    let meta = db.column_family_metadata();
    assert_eq!(meta.name, crate::DEFAULT_CF_NAME);
    assert_eq!(meta.levels.len(), 16);

    let file = &meta.levels[0].files[0];
    assert_eq!(file.num_entries, 10);
    assert!(file.size_bytes > 0);
    assert_eq!(file.smallest_key, b"m0000".to_vec());
    assert_eq!(file.largest_key, b"m0009".to_vec());
    assert!(!file.being_compacted);
    assert_eq!(meta.total_entries(), 10);
}

// --------------------- Executor ---------------------

#[test]
fn scheduled_jobs_run_on_background_threads() {
    let dir = tempdir().unwrap();
    let db = open_test_db(dir.path());

    let (tx, rx) = std::sync::mpsc::channel();
    for i in 0..4 {
        let tx = tx.clone();
        db.schedule(move || {
            tx.send(i).unwrap();
        });
    }

    let mut seen: Vec<i32> = (0..4)
        .map(|_| rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}
