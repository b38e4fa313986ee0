/// Open-time and per-compaction option records.
use std::sync::Arc;

use crate::filter::FilterPolicy;
use crate::listener::EventListener;

/// Options controlling how a [`Db`](crate::Db) is opened and behaves.
///
/// The engine runs no compactions of its own: level-zero growth is reported
/// through the flush event's backpressure flags and it is up to an installed
/// [`EventListener`] to schedule merges. The `level0_*` triggers are the
/// contract for those flags.
#[derive(Clone)]
pub struct DbOptions {
    /// Create the database directory if it does not exist.
    pub create_if_missing: bool,

    /// Number of physical levels. Level indices in
    /// [`compact_files`](crate::Db::compact_files) must stay below this.
    pub num_levels: usize,

    /// Memtable byte threshold that triggers an automatic flush.
    pub write_buffer_size: usize,

    /// Advisory L0 file count at which a listener is expected to react.
    pub level0_file_num_compaction_trigger: usize,

    /// L0 file count at which flush events carry
    /// `triggered_writes_slowdown`.
    pub level0_slowdown_writes_trigger: usize,

    /// L0 file count at which flush events carry `triggered_writes_stop`.
    pub level0_stop_writes_trigger: usize,

    /// Worker threads backing the background executor.
    pub parallelism: usize,

    /// Observers for flush and compaction completion events.
    pub listeners: Vec<Arc<dyn EventListener>>,

    /// Filter policy applied to every run file written. `None` disables
    /// filter blocks entirely.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            num_levels: 100,
            write_buffer_size: 64 * 1024 * 1024,
            level0_file_num_compaction_trigger: 4,
            level0_slowdown_writes_trigger: 20,
            level0_stop_writes_trigger: 36,
            parallelism: 1,
            listeners: Vec::new(),
            filter_policy: None,
        }
    }
}

impl std::fmt::Debug for DbOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbOptions")
            .field("create_if_missing", &self.create_if_missing)
            .field("num_levels", &self.num_levels)
            .field("write_buffer_size", &self.write_buffer_size)
            .field(
                "level0_slowdown_writes_trigger",
                &self.level0_slowdown_writes_trigger,
            )
            .field(
                "level0_stop_writes_trigger",
                &self.level0_stop_writes_trigger,
            )
            .field("parallelism", &self.parallelism)
            .field("listeners", &self.listeners.len())
            .field(
                "filter_policy",
                &self.filter_policy.as_ref().map(|p| p.name()),
            )
            .finish()
    }
}

/// Options for a single [`compact_files`](crate::Db::compact_files) call.
#[derive(Debug, Clone)]
pub struct CompactOptions {
    /// Merged output is split into files of at most this many bytes.
    pub output_file_size_limit: u64,
}

impl Default for CompactOptions {
    fn default() -> Self {
        Self {
            output_file_size_limit: u64::MAX,
        }
    }
}
