//! # Engine — multi-level sorted-run storage
//!
//! A deliberately small LSM storage engine that owns the mechanics —
//! buffering, run files, levels, merging — and none of the policy. It runs
//! no compactions on its own: every merge is an explicit
//! [`Db::compact_files`] call, and the engine's job is to report enough
//! state (metadata snapshots, flush backpressure flags, completion events)
//! for an external scheduler to drive the shape of the tree.
//!
//! ## Architecture
//!
//! ```text
//! Client / scheduler
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                       DB                         │
//! │                                                  │
//! │ write.rs  put() → memtable                       │
//! │              | (write_buffer_size exceeded?)     │
//! │              v                                   │
//! │           flush() → L0 run file                  │
//! │              |                                   │
//! │              v                                   │
//! │        on_flush_completed → listeners            │
//! │                                                  │
//! │ compact.rs  compact_files(inputs, level N)       │
//! │              → k-way merge → size-split outputs  │
//! │              → on_compaction_completed           │
//! │                                                  │
//! │ read.rs   get() → memtable → L0 (newest first)   │
//! │              → L1..Ln (range + filter pruned)    │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `lib.rs`     | `Db` struct, open/recovery, metadata, close, `Drop`  |
//! | [`write`]    | `put()`, `flush()`, the write-buffer threshold       |
//! | [`read`]     | `get()` across memtable and levels                   |
//! | [`compact`]  | `compact_files()` with k-way merge + output split    |
//! | [`table`]    | Run-file format (writer / reader / cursor)           |
//! | [`manifest`] | Persistent level assignments (atomic file ops)       |
//! | [`executor`] | Background thread pool for scheduled jobs            |
//! | [`listener`] | Flush / compaction completion hooks                  |
//! | [`filter`]   | Pluggable filter policy with per-level context       |
//!
//! ## Concurrency
//!
//! `Db` is `Sync`; all mutable state sits behind one mutex. The lock is
//! never held across file I/O for merges or across listener callbacks, so
//! listeners are free to query metadata and schedule further work.

mod compact;
mod error;
mod executor;
mod fault;
mod filter;
mod listener;
mod manifest;
mod memtable;
mod metadata;
mod options;
mod read;
mod table;
mod write;

pub use error::{EngineError, ErrorKind};
pub use fault::CompactionFault;
pub use filter::{
    BloomBitsBuilder, BloomFilterPolicy, FilterBitsBuilder, FilterContext, FilterPolicy,
};
pub use listener::{CompactionJobInfo, EventListener, FlushJobInfo};
pub use metadata::{ColumnFamilyMetaData, LevelMetaData, RunFileMetaData};
pub use options::{CompactOptions, DbOptions};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use executor::Executor;
use manifest::Manifest;
use memtable::Memtable;
use table::TableReader;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// The engine hosts a single column family under this name.
pub const DEFAULT_CF_NAME: &str = "default";

/// One live run file plus its compaction latch.
pub(crate) struct TableHandle {
    pub(crate) reader: Arc<TableReader>,
    pub(crate) being_compacted: bool,
}

/// Everything behind the state mutex.
pub(crate) struct DbState {
    pub(crate) mem: Memtable,
    /// `levels[0]` is newest-first; deeper levels keep placement order.
    pub(crate) levels: Vec<Vec<TableHandle>>,
    pub(crate) manifest: Manifest,
}

/// A multi-level sorted-run store with externally driven compaction.
///
/// Opened via [`Db::open`], which returns an `Arc` so background jobs and
/// event listeners can hold the handle. Writes flow `put → memtable →
/// flush → L0`; merges are explicit `compact_files` calls, usually issued
/// by a listener reacting to flush events.
pub struct Db {
    path: PathBuf,
    opts: DbOptions,
    pub(crate) state: Mutex<DbState>,
    write_buffer_size: AtomicUsize,
    next_file_number: AtomicU64,
    executor: Executor,
    pub(crate) faults: Mutex<VecDeque<CompactionFault>>,
    /// Self-reference handed to listeners so they can retain the handle
    /// in scheduled work. Upgrading fails only mid-drop, when no events
    /// fire anyway.
    weak_self: Weak<Db>,
}

impl Db {
    /// Opens (or creates) a database at `path`, restoring the level layout
    /// from the manifest.
    ///
    /// # Recovery steps
    ///
    /// 1. Create the directory if missing (when `create_if_missing`).
    /// 2. Remove leftover `.tmp` files from interrupted writes.
    /// 3. Load the manifest and reopen every live run file into its level.
    /// 4. Seed the file-number counter past every recovered file.
    pub fn open<P: AsRef<Path>>(opts: DbOptions, path: P) -> Result<Arc<Self>, EngineError> {
        let path = path.as_ref().to_path_buf();

        if opts.num_levels < 2 {
            return Err(EngineError::InvalidArgument(format!(
                "num_levels must be at least 2 (got {})",
                opts.num_levels
            )));
        }

        if !path.exists() {
            if !opts.create_if_missing {
                return Err(EngineError::InvalidArgument(format!(
                    "database {} does not exist and create_if_missing is off",
                    path.display()
                )));
            }
            std::fs::create_dir_all(&path)?;
        }

        cleanup_tmp_files(&path);

        let manifest = Manifest::load_or_create(&path)?;
        if let Some(max_level) = manifest.max_level() {
            if max_level >= opts.num_levels {
                return Err(EngineError::InvalidArgument(format!(
                    "manifest uses level {} but num_levels is {}",
                    max_level, opts.num_levels
                )));
            }
        }

        let mut levels: Vec<Vec<TableHandle>> = Vec::with_capacity(opts.num_levels);
        levels.resize_with(opts.num_levels, Vec::new);
        let mut max_file_number = 0u64;

        for level in 0..opts.num_levels {
            for filename in manifest.filenames_at(level) {
                let file_path = path.join(filename);
                if !file_path.exists() {
                    warn!(file = filename, level, "manifest references a missing run file, skipping");
                    continue;
                }
                let reader = Arc::new(TableReader::open(&file_path)?);
                max_file_number = max_file_number.max(reader.file_number());
                levels[level].push(TableHandle {
                    reader,
                    being_compacted: false,
                });
            }
        }

        debug!(
            path = %path.display(),
            files = manifest.entries.len(),
            "opened database"
        );

        let write_buffer_size = AtomicUsize::new(opts.write_buffer_size);
        let executor = Executor::new(opts.parallelism);

        Ok(Arc::new_cyclic(|weak_self| Self {
            path,
            opts,
            state: Mutex::new(DbState {
                mem: Memtable::new(),
                levels,
                manifest,
            }),
            write_buffer_size,
            next_file_number: AtomicU64::new(max_file_number + 1),
            executor,
            faults: Mutex::new(VecDeque::new()),
            weak_self: weak_self.clone(),
        }))
    }

    /// Deletes the database directory and everything in it.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<(), EngineError> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    /// Flushes any buffered writes and shuts the background executor down,
    /// waiting for queued jobs to finish. Idempotent.
    pub fn close(&self) -> Result<(), EngineError> {
        self.flush()?;
        self.executor.shutdown();
        Ok(())
    }

    /// A strong handle to this database, for listener callbacks and
    /// scheduled work. `None` only while the final drop is in progress.
    pub(crate) fn strong_self(&self) -> Option<Arc<Db>> {
        self.weak_self.upgrade()
    }

    /// Submits a job to the background executor.
    pub fn schedule<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.schedule(Box::new(job));
    }

    /// Snapshot of the current on-disk layout.
    pub fn column_family_metadata(&self) -> ColumnFamilyMetaData {
        let state = self.state.lock();
        let levels = state
            .levels
            .iter()
            .enumerate()
            .map(|(level, handles)| LevelMetaData {
                level,
                files: handles
                    .iter()
                    .map(|h| RunFileMetaData {
                        name: h.reader.name().to_string(),
                        size_bytes: h.reader.size_bytes(),
                        num_entries: h.reader.num_entries(),
                        smallest_key: h.reader.smallest_key().to_vec(),
                        largest_key: h.reader.largest_key().to_vec(),
                        being_compacted: h.being_compacted,
                    })
                    .collect(),
            })
            .collect();
        ColumnFamilyMetaData {
            name: DEFAULT_CF_NAME.to_string(),
            levels,
        }
    }

    /// Path of the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The options this database was opened with.
    #[must_use]
    pub fn options(&self) -> &DbOptions {
        &self.opts
    }

    /// Current flush threshold in bytes.
    #[must_use]
    pub fn write_buffer_size(&self) -> usize {
        self.write_buffer_size.load(Ordering::Acquire)
    }

    /// Overrides the flush threshold at runtime. Bulk loading uses this to
    /// fit an entire run in a single flush.
    pub fn set_write_buffer_size(&self, bytes: usize) {
        self.write_buffer_size.store(bytes, Ordering::Release);
    }

    pub(crate) fn allocate_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn run_file_name(number: u64) -> String {
        format!("{:06}.run", number)
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        let live_files: usize = state.levels.iter().map(|l| l.len()).sum();
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("memtable_entries", &state.mem.len())
            .field("memtable_size", &state.mem.approx_size())
            .field("live_files", &live_files)
            .field("write_buffer_size", &self.write_buffer_size())
            .finish()
    }
}

/// Best-effort flush on drop so buffered writes reach a run file. Errors
/// are ignored; `close()` is the checked path.
impl Drop for Db {
    fn drop(&mut self) {
        let dirty = {
            let state = self.state.lock();
            !state.mem.is_empty()
        };
        if dirty {
            let _ = self.write_level0_run();
        }
    }
}

/// Removes stale `.tmp` leftovers from interrupted writes.
fn cleanup_tmp_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let p = entry.path();
        if p.extension().map(|e| e == "tmp").unwrap_or(false) {
            warn!(file = %p.display(), "removing stale temp file");
            let _ = std::fs::remove_file(&p);
        }
    }
}

#[cfg(test)]
mod tests;
