/// Event hooks the engine fires after flushes and compactions.
///
/// Listeners are installed through [`DbOptions::listeners`] and invoked
/// synchronously on the thread that completed the work: flush events on the
/// writer's thread, compaction events on the executor worker that ran the
/// merge. A listener must not block for long and must not hold locks across
/// calls back into the engine.
use std::sync::Arc;

use crate::Db;

/// Details of a completed memtable flush.
#[derive(Debug, Clone)]
pub struct FlushJobInfo {
    /// Column family the flush belongs to.
    pub cf_name: String,
    /// Name of the run file the flush produced.
    pub file_name: String,
    /// True when the L0 file count has reached the slowdown trigger.
    pub triggered_writes_slowdown: bool,
    /// True when the L0 file count has reached the stop trigger.
    pub triggered_writes_stop: bool,
}

/// Details of a completed `compact_files` call.
#[derive(Debug, Clone)]
pub struct CompactionJobInfo {
    /// Column family the compaction belongs to.
    pub cf_name: String,
    /// Input run files, consumed and deleted.
    pub input_files: Vec<String>,
    /// Output run files installed at `output_level`.
    pub output_files: Vec<String>,
    /// Physical level the outputs landed on.
    pub output_level: usize,
}

/// Observer of engine lifecycle events. All methods default to no-ops so
/// implementations override only what they react to.
pub trait EventListener: Send + Sync {
    /// Called after a memtable flush lands in physical level 0.
    fn on_flush_completed(&self, _db: &Arc<Db>, _info: &FlushJobInfo) {}

    /// Called after a `compact_files` call installs its outputs.
    fn on_compaction_completed(&self, _db: &Arc<Db>, _info: &CompactionJobInfo) {}
}
