use parking_lot::Mutex;
use std::sync::Arc;

use crate::{
    CompactionJobInfo, Db, DbOptions, EventListener, FlushJobInfo,
};

/// Opens a DB with a small write buffer so tests control flush timing via
/// explicit `flush()` calls.
pub(super) fn open_test_db(dir: &std::path::Path) -> Arc<Db> {
    let opts = DbOptions {
        num_levels: 16,
        write_buffer_size: 1 << 20,
        ..Default::default()
    };
    Db::open(opts, dir.join("db")).expect("open test db")
}

/// Listener that records every event it sees.
#[derive(Default)]
pub(super) struct RecordingListener {
    pub flushes: Mutex<Vec<FlushJobInfo>>,
    pub compactions: Mutex<Vec<CompactionJobInfo>>,
}

impl EventListener for RecordingListener {
    fn on_flush_completed(&self, _db: &Arc<Db>, info: &FlushJobInfo) {
        self.flushes.lock().push(info.clone());
    }

    fn on_compaction_completed(&self, _db: &Arc<Db>, info: &CompactionJobInfo) {
        self.compactions.lock().push(info.clone());
    }
}

/// Writes `count` keys with a shared prefix and flushes them into one L0
/// run file.
pub(super) fn flush_run(db: &Arc<Db>, prefix: &str, count: usize) {
    for i in 0..count {
        db.put(
            format!("{prefix}{i:04}").into_bytes(),
            format!("value-{prefix}{i}").into_bytes(),
        )
        .expect("put");
    }
    db.flush().expect("flush");
}
