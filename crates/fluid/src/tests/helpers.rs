use config::FluidOptions;
use engine::{CompactOptions, Db, DbOptions};
use std::sync::Arc;

/// Small sizes so tests stage levels with a handful of writes.
pub(super) fn small_fluid_options() -> FluidOptions {
    FluidOptions {
        size_ratio: 2.0,
        lower_level_run_max: 1,
        largest_level_run_max: 1,
        buffer_size: 4096,
        entry_size: 64,
        ..Default::default()
    }
}

pub(super) fn open_db(dir: &std::path::Path, num_levels: usize) -> Arc<Db> {
    let opts = DbOptions {
        num_levels,
        write_buffer_size: 1 << 20,
        ..Default::default()
    };
    Db::open(opts, dir.join("db")).expect("open db")
}

/// Flushes `count` entries under `prefix` into one L0 run file and
/// returns its name.
pub(super) fn flush_prefixed_run(db: &Arc<Db>, prefix: &str, count: usize) -> String {
    for i in 0..count {
        db.put(
            format!("{prefix}{i:05}").into_bytes(),
            vec![b'v'; 48],
        )
        .expect("put");
    }
    db.flush().expect("flush");
    db.column_family_metadata().levels[0].files[0].name.clone()
}

/// Stages one run at `engine_level` by flushing `count` prefixed entries
/// and compacting the resulting L0 file down.
pub(super) fn stage_run(db: &Arc<Db>, prefix: &str, count: usize, engine_level: usize) {
    let name = flush_prefixed_run(db, prefix, count);
    db.compact_files(&CompactOptions::default(), &[name], engine_level)
        .expect("stage run");
}
