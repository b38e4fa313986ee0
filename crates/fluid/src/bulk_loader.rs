//! Direct materialization of a target tree shape.
//!
//! Rather than pushing a workload through the write path and letting the
//! controller converge, the bulk loader writes one run at a time into the
//! engine's buffer, flushes it to level 0, and issues a forced compaction
//! pinning the freshly flushed files to the run's destination physical
//! level. Keys and values are stamped with a `"<level>|"` ASCII prefix
//! (1-indexed fluid level) so placement is externally checkable.
//!
//! While a load is running the loader itself must be the engine's event
//! listener: its event handlers are no-ops, so nothing reacts to the
//! flushes and the only compactions are the loader's explicit pins. The
//! tasks still execute through the controller's regular worker and inherit
//! its retry handling.

use anyhow::{bail, Context, Result};
use config::FluidOptions;
use datagen::DataGenerator;
use engine::{CompactOptions, Db, EventListener, DEFAULT_CF_NAME};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::compactor::{CompactionTask, FluidLsmCompactor};
use crate::model::engine_level_for_run;

/// Entries written per batch between progress traces.
pub const BATCH_SIZE: usize = 1000;

/// Slack on the pin task's output size limit.
const OUTPUT_SIZE_SLACK: f64 = 1.05;

/// Write-buffer headroom multiplier: a run must fit one flush.
const RUN_BUFFER_HEADROOM: usize = 8;

/// Builds a database of a precise shape by writing runs and forcing each
/// one to its destination level.
pub struct BulkLoader {
    compactor: Arc<FluidLsmCompactor>,
    data_gen: Mutex<Box<dyn DataGenerator>>,
}

/// Event suppression: while the loader is the installed listener, flush
/// and compaction completions must not trigger scheduling.
impl EventListener for BulkLoader {}

impl BulkLoader {
    /// Creates a loader driving `compactor`'s task machinery with keys
    /// from `data_gen`.
    pub fn new(compactor: Arc<FluidLsmCompactor>, data_gen: Box<dyn DataGenerator>) -> Self {
        Self {
            compactor,
            data_gen: Mutex::new(data_gen),
        }
    }

    /// The controller whose task machinery executes the pins.
    #[must_use]
    pub fn compactor(&self) -> &Arc<FluidLsmCompactor> {
        &self.compactor
    }

    /// Loads the shape sized for `num_entries` total entries. Levels fill
    /// deepest-first at full capacity; loading stops once the running
    /// total exceeds `num_entries`. Returns the number of entries written.
    pub fn bulk_load_entries(&self, db: &Arc<Db>, num_entries: usize) -> Result<usize> {
        let opt = self.compactor.options();
        let levels = FluidLsmCompactor::estimate_levels(
            num_entries,
            opt.size_ratio,
            opt.entry_size,
            opt.buffer_size,
        );
        info!(entries = num_entries, levels, "bulk loading by entry count");
        self.bulk_load(db, &self.capacities(opt, levels), num_entries)
    }

    /// Loads exactly `levels` fluid levels to capacity. Returns the number
    /// of entries written.
    pub fn bulk_load_levels(&self, db: &Arc<Db>, levels: usize) -> Result<usize> {
        let opt = self.compactor.options();
        info!(levels, "bulk loading by level count");
        self.bulk_load(db, &self.capacities(opt, levels), usize::MAX)
    }

    /// Per-level entry capacities: `(B/E)(T-1)` at the first fluid level,
    /// growing by `T` per level.
    fn capacities(&self, opt: &FluidOptions, levels: usize) -> Vec<usize> {
        let t = opt.size_ratio;
        let mut caps = Vec::with_capacity(levels.max(1));
        caps.push(
            (opt.entries_per_buffer() as f64 * (t - 1.0)) as usize,
        );
        for idx in 1..levels {
            caps.push((caps[idx - 1] as f64 * t) as usize);
        }
        caps
    }

    /// Fills levels deepest-first until the capacity list is exhausted or
    /// `max_entries` is exceeded, then runs the drain protocol.
    fn bulk_load(&self, db: &Arc<Db>, capacities: &[usize], max_entries: usize) -> Result<usize> {
        let last_idx = capacities.len().saturating_sub(1);
        let mut loaded = 0usize;

        for idx in (0..capacities.len()).rev() {
            if loaded > max_entries {
                debug!(loaded, max_entries, "entry budget exceeded, stopping");
                break;
            }
            let num_runs = self.runs_for_level(idx, last_idx);
            loaded += self
                .bulk_load_single_level(db, idx, capacities[idx], num_runs)
                .with_context(|| format!("bulk loading fluid level {}", idx + 1))?;
        }

        // Undo the per-run buffer widening before handing the engine back.
        db.set_write_buffer_size(self.compactor.options().buffer_size);
        self.drain(db)?;
        info!(loaded, "bulk load complete");
        Ok(loaded)
    }

    /// Run width per level: `T - 1` at the first fluid level, `Z` at the
    /// deepest, `K` in between.
    fn runs_for_level(&self, idx: usize, last_idx: usize) -> usize {
        let opt = self.compactor.options();
        if idx == 0 {
            (opt.size_ratio.round() as usize).saturating_sub(1).max(1)
        } else if idx == last_idx {
            opt.largest_level_run_max
        } else {
            opt.lower_level_run_max
        }
    }

    /// Writes `num_runs` runs for fluid level `idx` and, for every level
    /// but the first, pins each run to its physical slot.
    fn bulk_load_single_level(
        &self,
        db: &Arc<Db>,
        idx: usize,
        capacity: usize,
        num_runs: usize,
    ) -> Result<usize> {
        let entries_per_run = capacity / num_runs;
        if entries_per_run == 0 {
            warn!(level = idx + 1, capacity, num_runs, "level too small for a run, skipping");
            return Ok(0);
        }

        let opt = self.compactor.options();
        let k = opt.lower_level_run_max;
        let mut written = 0usize;

        for slot in 0..num_runs {
            written += self.bulk_load_single_run(db, idx, entries_per_run)?;
            if idx == 0 {
                // First-fluid-level runs live in L0 as-is.
                continue;
            }
            if slot > k {
                bail!(
                    "run width {} exceeds the {} physical slots of a fluid level",
                    num_runs,
                    k + 1
                );
            }

            // The run was just flushed; everything sitting in L0 and not
            // already latched belongs to it.
            let meta = db.column_family_metadata();
            let input_files: Vec<String> = meta.levels[0]
                .files
                .iter()
                .filter(|f| !f.being_compacted)
                .map(|f| f.name.clone())
                .collect();
            if input_files.is_empty() {
                warn!(level = idx + 1, slot, "no L0 files to pin, run lost to collisions?");
                continue;
            }

            let target = engine_level_for_run(idx, k, slot);
            let limit =
                (entries_per_run as f64 * opt.entry_size as f64 * OUTPUT_SIZE_SLACK) as u64;
            let task = CompactionTask::new(
                Arc::clone(db),
                DEFAULT_CF_NAME.to_string(),
                input_files,
                0,
                target,
                CompactOptions {
                    output_file_size_limit: limit,
                },
                true,
                self.compactor.in_flight_handle(),
                k,
            );
            debug!(
                level = idx + 1,
                slot,
                engine_level = target,
                entries = entries_per_run,
                "pinning run"
            );
            self.compactor.schedule_compaction(task);

            // L0 must be clear before the next run is flushed, otherwise
            // the next pin would sweep this run's stragglers along.
            self.wait_for_in_flight();
        }

        Ok(written)
    }

    /// Writes one run's entries through the engine's write path and
    /// flushes it into a single L0 file. The write buffer is widened first
    /// so the run cannot flush early.
    fn bulk_load_single_run(&self, db: &Arc<Db>, idx: usize, entries: usize) -> Result<usize> {
        let opt = self.compactor.options();
        db.set_write_buffer_size(opt.entry_size * entries * RUN_BUFFER_HEADROOM);

        // Level marker, 1-indexed: placement is checkable from the data.
        let prefix = format!("{}|", idx + 1);

        let mut data_gen = self.data_gen.lock();
        let mut attempted = 0usize;
        let mut failures = 0usize;
        let mut remaining = entries;

        while remaining > 0 {
            let batch = remaining.min(BATCH_SIZE);
            for _ in 0..batch {
                let (key, value) = data_gen.generate_kv_pair(opt.entry_size, &prefix, &prefix);
                attempted += 1;
                if let Err(e) = db.put(key.into_bytes(), value.into_bytes()) {
                    failures += 1;
                    warn!(error = %e, "bulk write failed");
                    // A few failures are tolerable; a double-digit rate
                    // means the engine is wedged.
                    if failures * 10 > attempted {
                        bail!(
                            "aborting bulk load: {} of {} writes failed",
                            failures,
                            attempted
                        );
                    }
                }
            }
            remaining -= batch;
            trace!(level = idx + 1, written = attempted, "bulk batch complete");
        }

        db.flush().context("flushing bulk run")?;
        Ok(attempted - failures)
    }

    /// The canonical drain protocol: flush, busy-wait for the in-flight
    /// counter to hit zero, then keep sweeping until no level needs
    /// compaction.
    pub fn drain(&self, db: &Arc<Db>) -> Result<()> {
        db.flush().context("drain flush")?;
        self.compactor.wait_for_quiesce(db);
        Ok(())
    }

    fn wait_for_in_flight(&self) {
        while self.compactor.compactions_left_count() > 0 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}
