//! Shared wiring between the builder and runner binaries.
//!
//! Opening a database for the fluid stack always means the same dance:
//! size the engine from the fluid options, hand it the L0 backpressure
//! triggers (`K+1` / `8(K+1)` / `10(K+1)`), install the Monkey filter
//! policy, and register exactly one event listener — the bulk loader
//! (whose event handlers are no-ops) while building, the live controller
//! while running.

use anyhow::{Context, Result};
use config::FluidOptions;
use datagen::DataGenerator;
use engine::{Db, DbOptions, EventListener};
use fluid::{fluid_level_for_engine_level, BulkLoader, FluidLsmCompactor};
use monkey::MonkeyFilterPolicy;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Fixed parameters shared by both tools.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Engine physical level count.
    pub max_engine_levels: usize,
    /// Background executor threads.
    pub parallelism: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_engine_levels: 100,
            parallelism: 1,
        }
    }
}

/// Outcome of one workload phase.
#[derive(Debug, Clone)]
pub struct PhaseStats {
    /// Operations attempted.
    pub operations: usize,
    /// Operations that found a value (read phases) or succeeded (write
    /// phase).
    pub hits: usize,
    /// Wall-clock duration of the phase.
    pub elapsed: Duration,
}

/// Engine options derived from the fluid configuration. `monkey_levels`
/// sizes the filter allocation; pass the bulk target's level count when
/// known, or [`default_monkey_levels`] otherwise.
pub fn db_options(
    fluid_opt: &FluidOptions,
    driver: &DriverConfig,
    monkey_levels: usize,
    listeners: Vec<Arc<dyn EventListener>>,
) -> DbOptions {
    let k = fluid_opt.lower_level_run_max;
    DbOptions {
        create_if_missing: true,
        num_levels: driver.max_engine_levels,
        write_buffer_size: fluid_opt.buffer_size,
        level0_file_num_compaction_trigger: k + 1,
        level0_slowdown_writes_trigger: 8 * (k + 1),
        level0_stop_writes_trigger: 10 * (k + 1),
        parallelism: driver.parallelism,
        listeners,
        filter_policy: Some(Arc::new(MonkeyFilterPolicy::new(
            fluid_opt.bits_per_element,
            fluid_opt.size_ratio,
            monkey_levels.max(1),
            k,
        ))),
    }
}

/// Monkey level count when no bulk target pins it down: every fluid level
/// the engine can physically hold.
#[must_use]
pub fn default_monkey_levels(fluid_opt: &FluidOptions, max_engine_levels: usize) -> usize {
    fluid_level_for_engine_level(
        max_engine_levels.saturating_sub(1),
        fluid_opt.lower_level_run_max,
    ) + 1
}

/// Opens a database wired for bulk loading: the loader is the installed
/// listener, so flushes trigger nothing and every compaction is an
/// explicit pin.
pub fn open_for_bulk_load(
    db_path: &Path,
    fluid_opt: &FluidOptions,
    driver: &DriverConfig,
    monkey_levels: usize,
    generator: Box<dyn DataGenerator>,
) -> Result<(Arc<Db>, Arc<BulkLoader>)> {
    let compactor = Arc::new(FluidLsmCompactor::new(
        fluid_opt.clone(),
        driver.max_engine_levels,
    ));
    let loader = Arc::new(BulkLoader::new(Arc::clone(&compactor), generator));

    let opts = db_options(
        fluid_opt,
        driver,
        monkey_levels,
        vec![Arc::clone(&loader) as Arc<dyn EventListener>],
    );
    let db = Db::open(opts, db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;
    compactor.init_open_db(&db);
    Ok((db, loader))
}

/// Opens a database with the live controller installed: flush and
/// compaction events drive the fluid policy.
pub fn open_with_controller(
    db_path: &Path,
    fluid_opt: &FluidOptions,
    driver: &DriverConfig,
) -> Result<(Arc<Db>, Arc<FluidLsmCompactor>)> {
    let compactor = Arc::new(FluidLsmCompactor::new(
        fluid_opt.clone(),
        driver.max_engine_levels,
    ));
    let monkey_levels = default_monkey_levels(fluid_opt, driver.max_engine_levels);

    let opts = db_options(
        fluid_opt,
        driver,
        monkey_levels,
        vec![Arc::clone(&compactor) as Arc<dyn EventListener>],
    );
    let db = Db::open(opts, db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;
    compactor.init_open_db(&db);
    Ok((db, compactor))
}

/// Pushes `count` generated entries through the engine's write path, then
/// flushes and waits for the controller to settle the shape.
pub fn write_phase(
    db: &Arc<Db>,
    compactor: &FluidLsmCompactor,
    generator: &mut dyn DataGenerator,
    count: usize,
    entry_size: usize,
) -> Result<PhaseStats> {
    info!(writes = count, "starting write phase");
    let start = Instant::now();
    let mut failures = 0usize;

    for idx in 0..count {
        let (key, value) = generator.generate_kv_pair(entry_size, "", "");
        if let Err(e) = db.put(key.into_bytes(), value.into_bytes()) {
            failures += 1;
            warn!(write = idx, error = %e, "write failed");
        }
    }

    db.flush().context("post-write flush")?;
    compactor.wait_for_quiesce(db);

    let stats = PhaseStats {
        operations: count,
        hits: count - failures,
        elapsed: start.elapsed(),
    };
    info!(
        writes = stats.operations,
        failed = failures,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "write phase done"
    );
    Ok(stats)
}

/// Point reads with keys drawn from the generator's own distribution;
/// hits count the reads that found a value.
pub fn read_phase(
    db: &Arc<Db>,
    generator: &mut dyn DataGenerator,
    count: usize,
) -> Result<PhaseStats> {
    info!(reads = count, "starting read phase");
    let start = Instant::now();
    let mut hits = 0usize;

    for _ in 0..count {
        let key = generator.generate_key("");
        if db.get(key.as_bytes())?.is_some() {
            hits += 1;
        }
    }

    let stats = PhaseStats {
        operations: count,
        hits,
        elapsed: start.elapsed(),
    };
    info!(
        reads = stats.operations,
        hits = stats.hits,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "read phase done"
    );
    Ok(stats)
}

/// Point reads with keys offset past the generator's domain, so every
/// probe is guaranteed absent. Hits are engine-level false positives that
/// survived the filters all the way to `None`-free lookups.
pub fn empty_read_phase(
    db: &Arc<Db>,
    generator: &mut dyn DataGenerator,
    count: usize,
) -> Result<PhaseStats> {
    info!(reads = count, "starting empty-read phase");
    let domain = generator.key_domain();
    let start = Instant::now();
    let mut hits = 0usize;

    for _ in 0..count {
        let key = (domain + 1 + generator.next_key_number()).to_string();
        if db.get(key.as_bytes())?.is_some() {
            hits += 1;
        }
    }

    let stats = PhaseStats {
        operations: count,
        hits,
        elapsed: start.elapsed(),
    };
    info!(
        reads = stats.operations,
        unexpected_hits = stats.hits,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "empty-read phase done"
    );
    Ok(stats)
}
