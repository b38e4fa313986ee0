//! Event-driven compaction scheduling.
//!
//! [`FluidLsmCompactor`] is installed as the engine's [`EventListener`].
//! On every flush or compaction completion it rebuilds the fluid view
//! from fresh metadata, sweeps levels from the deepest occupied one up to
//! the surface, and schedules a merge for every level holding more live
//! runs than its width allows:
//!
//! - fluid level 0 (the buffer's landing zone): more than `T - 1` runs,
//! - interior levels: more than `K` runs,
//! - the deepest occupied level: more than `Z` runs.
//!
//! A scheduled task packs every non-latched file of the level and targets
//! the first empty physical slot of the next fluid level, sized so the
//! merged run fits its destination (`capacity / width`, with 5% slack for
//! per-file metadata). Tasks run on the engine's background executor;
//! transient failures requeue as retry tasks a bounded number of times.
//! I/O and invalid-argument failures are terminal — the invalid-argument
//! case is the normal signature of two sweeps racing over the same files,
//! and the next event simply picks again.

use config::FluidOptions;
use engine::{
    CompactOptions, CompactionJobInfo, Db, EventListener, FlushJobInfo, DEFAULT_CF_NAME,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::model::{engine_level_for_run, fluid_level_for_engine_level, FluidLevel, FluidRun};

/// Transient failures are requeued at most this many times per task.
pub const MAX_COMPACTION_RETRIES: u32 = 3;

/// Slack multiplier on output file size limits, reserving room for
/// per-file metadata blocks.
const OUTPUT_SIZE_SLACK: f64 = 1.05;

/// Shared in-flight accounting. Incremented once when a task is first
/// submitted, decremented exactly once when its lineage reaches a terminal
/// state; retry submissions do not touch it. Read lock-free by drain
/// loops.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        let prev = self.count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "in-flight counter underflow");
    }

    fn load(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// One scheduled merge: a set of input files bound for an output level.
pub struct CompactionTask {
    /// Engine handle the merge runs against.
    pub db: Arc<Db>,
    /// Column family the inputs belong to.
    pub cf_name: String,
    /// Input file names, all from one fluid level.
    pub input_files: Vec<String>,
    /// Destination engine (physical) level.
    pub output_level: usize,
    /// Per-task compaction options (carries the output size limit).
    pub compact_options: CompactOptions,
    /// Fluid level the inputs were picked from.
    pub origin_level: usize,
    /// Requeue once on a transient engine failure.
    pub retry_on_fail: bool,
    /// True for requeued tasks; they never touch the in-flight counter.
    pub is_retry: bool,
    retries_left: u32,
    in_flight: Arc<InFlight>,
}

impl CompactionTask {
    /// Builds a task, checking the one invariant that would make the merge
    /// nonsensical: the output must sit strictly below the origin.
    ///
    /// # Panics
    ///
    /// Panics if the output's fluid level is not deeper than
    /// `origin_level`, or if `input_files` is empty — both are programmer
    /// errors, not runtime conditions.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        db: Arc<Db>,
        cf_name: String,
        input_files: Vec<String>,
        origin_level: usize,
        output_level: usize,
        compact_options: CompactOptions,
        retry_on_fail: bool,
        in_flight: Arc<InFlight>,
        k: usize,
    ) -> Self {
        assert!(!input_files.is_empty(), "compaction task with no inputs");
        assert!(
            fluid_level_for_engine_level(output_level, k) > origin_level,
            "output level {} does not sit below fluid level {}",
            output_level,
            origin_level
        );
        Self {
            db,
            cf_name,
            input_files,
            output_level,
            compact_options,
            origin_level,
            retry_on_fail,
            is_retry: false,
            retries_left: MAX_COMPACTION_RETRIES,
            in_flight,
        }
    }

    /// The replacement task submitted after a transient failure.
    fn into_retry(self) -> Self {
        Self {
            is_retry: true,
            retries_left: self.retries_left.saturating_sub(1),
            ..self
        }
    }
}

/// The Fluid LSM compaction controller.
///
/// Stateless between events apart from the in-flight counter and the
/// mutex-guarded fluid view, which is rebuilt from engine metadata at the
/// top of every entry point. Never mutates engine state directly — all
/// data movement goes through scheduled [`CompactionTask`]s.
pub struct FluidLsmCompactor {
    fluid_opt: FluidOptions,
    compact_opt: CompactOptions,
    pub(crate) levels: Mutex<Vec<FluidLevel>>,
    in_flight: Arc<InFlight>,
}

impl FluidLsmCompactor {
    /// Creates a controller for an engine opened with `num_engine_levels`
    /// physical levels.
    pub fn new(fluid_opt: FluidOptions, num_engine_levels: usize) -> Self {
        let k = fluid_opt.lower_level_run_max;
        let fluid_count =
            fluid_level_for_engine_level(num_engine_levels.saturating_sub(1), k) + 1;
        let mut levels = Vec::with_capacity(fluid_count);
        levels.resize_with(fluid_count, FluidLevel::new);

        Self {
            fluid_opt,
            compact_opt: CompactOptions::default(),
            levels: Mutex::new(levels),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// The options this controller runs with.
    #[must_use]
    pub fn options(&self) -> &FluidOptions {
        &self.fluid_opt
    }

    /// Number of tasks submitted and not yet terminal. Zero means the
    /// tree is quiescent.
    #[must_use]
    pub fn compactions_left_count(&self) -> usize {
        self.in_flight.load()
    }

    pub(crate) fn in_flight_handle(&self) -> Arc<InFlight> {
        Arc::clone(&self.in_flight)
    }

    /// Rebuilds the fluid view from a fresh metadata snapshot. Idempotent
    /// for an unchanged engine; called at the top of every event handler.
    pub fn init_open_db(&self, db: &Db) {
        let meta = db.column_family_metadata();
        let k = self.fluid_opt.lower_level_run_max;

        let mut levels = self.levels.lock();
        for level in levels.iter_mut() {
            level.clear();
        }
        if meta.levels.len() < 2 {
            return;
        }

        // Fluid level 0: each L0 file is its own run, physical level 1 is
        // one run. Pad with empty runs up to K so run indices stay stable
        // while the level fills.
        let occupied =
            meta.levels[0].files.len() + usize::from(!meta.levels[1].files.is_empty());
        for _ in occupied..k {
            levels[0].add_run(FluidRun::new(0));
        }
        for file in &meta.levels[0].files {
            let mut run = FluidRun::new(0);
            run.add_file(file.clone());
            trace!(file = %file.name, "mapped L0 file to fluid level 0");
            levels[0].add_run(run);
        }
        let mut level1_run = FluidRun::new(1);
        for file in &meta.levels[1].files {
            level1_run.add_file(file.clone());
        }
        levels[0].add_run(level1_run);

        // Deeper physical levels: one run per occupied level.
        for level_meta in meta.levels.iter().skip(2) {
            if level_meta.files.is_empty() {
                continue;
            }
            let fluid = fluid_level_for_engine_level(level_meta.level, k);
            let mut run = FluidRun::new(level_meta.level);
            for file in &level_meta.files {
                run.add_file(file.clone());
            }
            trace!(
                engine_level = level_meta.level,
                fluid_level = fluid,
                files = level_meta.files.len(),
                "mapped engine level to fluid run"
            );
            if fluid < levels.len() {
                levels[fluid].add_run(run);
            } else {
                warn!(
                    engine_level = level_meta.level,
                    "engine level maps past the modeled fluid levels"
                );
            }
        }
    }

    /// Live-run count per modeled fluid level — a compact summary of the
    /// current view for diagnostics and shape checks.
    #[must_use]
    pub fn live_runs_per_level(&self) -> Vec<usize> {
        self.levels
            .lock()
            .iter()
            .map(|level| level.num_live_runs())
            .collect()
    }

    /// Deepest fluid level holding any non-empty run; 0 for an empty
    /// tree.
    #[must_use]
    pub fn largest_occupied_level(&self) -> usize {
        Self::largest_locked(&self.levels.lock())
    }

    fn largest_locked(levels: &[FluidLevel]) -> usize {
        levels
            .iter()
            .enumerate()
            .rev()
            .find(|(_, level)| level.size() > 0)
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }

    /// Width the saturation predicate allows at `idx`.
    fn saturated(&self, levels: &[FluidLevel], idx: usize, largest: usize) -> bool {
        let runs = levels[idx].num_live_runs();
        if idx == 0 {
            // The buffer's landing zone tolerates T - 1 runs.
            runs > self.buffer_level_width()
        } else if idx < largest {
            runs > self.fluid_opt.lower_level_run_max
        } else {
            runs > self.fluid_opt.largest_level_run_max
        }
    }

    fn buffer_level_width(&self) -> usize {
        (self.fluid_opt.size_ratio.round() as usize).saturating_sub(1).max(1)
    }

    /// Byte capacity of 0-based fluid level `idx`:
    /// `(T - 1) * T^(idx+1) * B`.
    #[must_use]
    pub fn capacity_bytes(&self, idx: usize) -> f64 {
        let t = self.fluid_opt.size_ratio;
        (t - 1.0) * t.powi(idx as i32 + 1) * self.fluid_opt.buffer_size as f64
    }

    /// Levels a tree of `n` entries needs: 1 if everything fits in the
    /// buffer, else `ceil(log_T(nE/B + 1))`.
    #[must_use]
    pub fn estimate_levels(n: usize, t: f64, e: usize, b: usize) -> usize {
        let data_bytes = n.saturating_mul(e);
        if data_bytes < b {
            warn!(
                entries = n,
                "entry count fits in the write buffer, defaulting to one level"
            );
            return 1;
        }
        let ratio = data_bytes as f64 / b as f64;
        ((ratio + 1.0).ln() / t.ln()).ceil() as usize
    }

    /// Evaluates fluid level `level_idx` against the saturation predicate
    /// and, if it is over-saturated, emits a task merging all its
    /// non-latched files into the next fluid level. Returns `None` when no
    /// compaction is needed or no output slot is free.
    pub fn pick_compaction(
        &self,
        db: &Arc<Db>,
        cf_name: &str,
        level_idx: usize,
    ) -> Option<CompactionTask> {
        let k = self.fluid_opt.lower_level_run_max;
        let z = self.fluid_opt.largest_level_run_max;
        let levels = self.levels.lock();

        let largest = Self::largest_locked(&levels);
        if level_idx >= levels.len() || !self.saturated(&levels, level_idx, largest) {
            return None;
        }

        let mut input_files = Vec::new();
        for run in levels[level_idx].runs() {
            for file in run.files() {
                if file.being_compacted {
                    continue;
                }
                trace!(file = %file.name, "adding file to compaction input");
                input_files.push(file.name.clone());
            }
        }
        if input_files.is_empty() {
            return None;
        }

        let output_fluid = level_idx + 1;
        if output_fluid >= levels.len() {
            warn!(
                level = level_idx,
                "deepest modeled level is over-saturated with nowhere to merge"
            );
            return None;
        }

        // Output goes to the first empty physical slot of the destination
        // level; the K+1 spacing guarantees one exists unless every slot
        // has an in-flight or settled run.
        let num_engine_levels = db.options().num_levels;
        let output_engine_level = (0..=k)
            .map(|slot| engine_level_for_run(output_fluid, k, slot))
            .filter(|&p| p < num_engine_levels)
            .find(|&p| {
                !levels[output_fluid]
                    .runs()
                    .iter()
                    .any(|r| r.engine_level() == p && !r.is_empty())
            });
        let Some(output_engine_level) = output_engine_level else {
            debug!(
                level = level_idx,
                "no free slot at the destination level, deferring"
            );
            return None;
        };

        // Merging the penultimate level feeds the current last level, so
        // the output splits across Z runs; everywhere else the interior
        // width K applies (including a merge that grows the tree by one
        // level).
        let width = if output_fluid == largest { z } else { k };
        let limit = (self.capacity_bytes(output_fluid) / width as f64 * OUTPUT_SIZE_SLACK) as u64;
        let mut compact_options = self.compact_opt.clone();
        compact_options.output_file_size_limit = limit;

        debug!(
            origin = level_idx,
            output = output_fluid,
            engine_level = output_engine_level,
            files = input_files.len(),
            size_limit = limit,
            "picked compaction"
        );

        Some(CompactionTask::new(
            Arc::clone(db),
            cf_name.to_string(),
            input_files,
            level_idx,
            output_engine_level,
            compact_options,
            false,
            self.in_flight_handle(),
            k,
        ))
    }

    /// Submits a task to the engine's background executor, incrementing
    /// the in-flight counter unless the task is a retry.
    pub fn schedule_compaction(&self, task: CompactionTask) {
        Self::submit(task);
    }

    fn submit(task: CompactionTask) {
        if !task.is_retry {
            task.in_flight.start();
        }
        let db = Arc::clone(&task.db);
        db.schedule(move || Self::compact_files(task));
    }

    /// Worker body: runs the merge and settles the task's fate. I/O and
    /// invalid-argument failures are terminal; other failures requeue as a
    /// retry task when `retry_on_fail` is set, without touching the
    /// in-flight counter.
    pub fn compact_files(task: CompactionTask) {
        let result = task.db.compact_files(
            &task.compact_options,
            &task.input_files,
            task.output_level,
        );

        match result {
            Ok(()) => {
                debug!(
                    origin = task.origin_level,
                    output = task.output_level,
                    files = task.input_files.len(),
                    "compaction task finished"
                );
                task.in_flight.finish();
            }
            Err(e) if e.is_io() || e.is_invalid_argument() => {
                warn!(
                    origin = task.origin_level,
                    output = task.output_level,
                    files = task.input_files.len(),
                    error = %e,
                    "compaction task failed terminally"
                );
                task.in_flight.finish();
            }
            Err(e) if task.retry_on_fail && task.retries_left > 0 => {
                warn!(
                    origin = task.origin_level,
                    output = task.output_level,
                    error = %e,
                    retries_left = task.retries_left,
                    "transient compaction failure, requeueing"
                );
                Self::submit(task.into_retry());
            }
            Err(e) => {
                warn!(
                    origin = task.origin_level,
                    output = task.output_level,
                    error = %e,
                    "transient compaction failure with no retries left, giving up"
                );
                task.in_flight.finish();
            }
        }
    }

    /// Polling entry used after bulk phases: refreshes the view, sweeps
    /// from the deepest occupied level toward the surface, and schedules a
    /// task for every level still over-saturated. Returns whether any task
    /// was scheduled.
    pub fn requires_compaction(&self, db: &Arc<Db>) -> bool {
        self.init_open_db(db);
        self.sweep(db, DEFAULT_CF_NAME, false)
    }

    /// Busy-waits until every submitted task is terminal and no level
    /// needs compaction — the tail of the drain protocol. The caller is
    /// expected to flush first.
    pub fn wait_for_quiesce(&self, db: &Arc<Db>) {
        self.wait_for_in_flight();
        while self.requires_compaction(db) {
            self.wait_for_in_flight();
        }
    }

    fn wait_for_in_flight(&self) {
        while self.compactions_left_count() > 0 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// One top-down saturation sweep; returns whether anything was
    /// scheduled.
    fn sweep(&self, db: &Arc<Db>, cf_name: &str, retry_on_fail: bool) -> bool {
        let largest = self.largest_occupied_level();
        let mut scheduled = false;
        for level_idx in (0..=largest).rev() {
            if let Some(mut task) = self.pick_compaction(db, cf_name, level_idx) {
                task.retry_on_fail = retry_on_fail;
                self.schedule_compaction(task);
                scheduled = true;
            }
        }
        scheduled
    }
}

impl EventListener for FluidLsmCompactor {
    /// Flush landed in L0: refresh the view and cascade from the deepest
    /// occupied level up, so backlog below is cleared before surface work
    /// piles on. The engine's slowdown flag rides along as the tasks'
    /// retry policy.
    fn on_flush_completed(&self, db: &Arc<Db>, info: &FlushJobInfo) {
        trace!(file = %info.file_name, "flush completed, evaluating saturation");
        self.init_open_db(db);
        self.sweep(db, &info.cf_name, info.triggered_writes_slowdown);
    }

    /// A merge finished; its output may have tipped the next level over
    /// its width, so sweep again.
    fn on_compaction_completed(&self, db: &Arc<Db>, info: &CompactionJobInfo) {
        trace!(
            output_level = info.output_level,
            outputs = info.output_files.len(),
            "compaction completed, evaluating saturation"
        );
        self.init_open_db(db);
        self.sweep(db, &info.cf_name, false);
    }
}
