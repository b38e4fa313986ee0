//! Builds a database of a precise fluid shape via the bulk loader.
//!
//! ```text
//! db_builder /tmp/db -T 4 -K 3 -Z 1 -B 4194304 -E 1024 -L 3 -d
//! db_builder /tmp/db -N 1000000
//! ```
//!
//! Exactly one of `-N` (entry count) or `-L` (level count) selects the
//! target shape. On success the fluid configuration is written into the
//! database directory so `db_runner` can reopen it with the same shape.

use anyhow::Result;
use clap::{ArgGroup, Parser};
use cli::driver::{self, DriverConfig};
use config::{BulkLoadMode, FluidOptions, CONFIG_FILENAME};
use datagen::UniformGenerator;
use engine::Db;
use fluid::FluidLsmCompactor;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "db_builder",
    about = "Bulk-build an LSM database with a fluid tiered/leveled shape"
)]
#[command(group(ArgGroup::new("fill").required(true).args(["entries", "levels"])))]
struct Args {
    /// Path to the database directory.
    db_path: PathBuf,

    /// Size ratio between consecutive fluid levels (T).
    #[arg(short = 'T', long = "size-ratio", default_value_t = 2.0)]
    size_ratio: f64,

    /// Max concurrent runs per non-last fluid level (K).
    #[arg(short = 'K', long = "lower-level-run-max", default_value_t = 1)]
    lower_level_run_max: usize,

    /// Max concurrent runs at the last fluid level (Z).
    #[arg(short = 'Z', long = "largest-level-run-max", default_value_t = 1)]
    largest_level_run_max: usize,

    /// Write buffer size in bytes (B).
    #[arg(short = 'B', long = "buffer-size", default_value_t = 1_048_576)]
    buffer_size: usize,

    /// Entry size in bytes (E), minimum 32.
    #[arg(short = 'E', long = "entry-size", default_value_t = 8192)]
    entry_size: usize,

    /// Bloom filter budget in bits per entry (h).
    #[arg(short = 'b', long = "bpe", default_value_t = 5.0)]
    bits_per_element: f64,

    /// Fill to roughly this many entries.
    #[arg(short = 'N', long = "entries")]
    entries: Option<usize>,

    /// Fill exactly this many fluid levels.
    #[arg(short = 'L', long = "levels")]
    levels: Option<usize>,

    /// Destroy any existing database at the path first.
    #[arg(short = 'd', long = "destroy")]
    destroy: bool,

    /// Physical levels the engine is opened with.
    #[arg(long = "max-engine-levels", default_value_t = 100)]
    max_engine_levels: usize,

    /// Background executor threads.
    #[arg(long = "parallelism", default_value_t = 1)]
    parallelism: usize,

    /// RNG seed for the data generator.
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,

    /// Verbosity: 0 = info, 1 = debug, 2 = trace.
    #[arg(short = 'v', long = "verbose", default_value_t = 0)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    cli::init_logging(args.verbose);

    let mut fluid_opt = FluidOptions {
        size_ratio: args.size_ratio,
        lower_level_run_max: args.lower_level_run_max,
        largest_level_run_max: args.largest_level_run_max,
        buffer_size: args.buffer_size,
        entry_size: args.entry_size,
        bits_per_element: args.bits_per_element,
        ..Default::default()
    };
    match (args.entries, args.levels) {
        (Some(n), _) => {
            fluid_opt.bulk_load_mode = BulkLoadMode::Entries;
            fluid_opt.num_entries = n;
        }
        (_, Some(l)) => {
            fluid_opt.bulk_load_mode = BulkLoadMode::Levels;
            fluid_opt.levels = l;
        }
        (None, None) => unreachable!("clap enforces the fill group"),
    }
    fluid_opt.validate()?;

    if args.destroy {
        info!(path = %args.db_path.display(), "destroying existing database");
        Db::destroy(&args.db_path)?;
    }

    let driver_cfg = DriverConfig {
        max_engine_levels: args.max_engine_levels,
        parallelism: args.parallelism,
    };
    let monkey_levels = match fluid_opt.bulk_load_mode {
        BulkLoadMode::Entries => FluidLsmCompactor::estimate_levels(
            fluid_opt.num_entries,
            fluid_opt.size_ratio,
            fluid_opt.entry_size,
            fluid_opt.buffer_size,
        ),
        BulkLoadMode::Levels => fluid_opt.levels,
    };

    info!(path = %args.db_path.display(), "building database");
    let (db, loader) = driver::open_for_bulk_load(
        &args.db_path,
        &fluid_opt,
        &driver_cfg,
        monkey_levels,
        Box::new(UniformGenerator::new(args.seed)),
    )?;

    let loaded = match fluid_opt.bulk_load_mode {
        BulkLoadMode::Entries => loader.bulk_load_entries(&db, fluid_opt.num_entries)?,
        BulkLoadMode::Levels => loader.bulk_load_levels(&db, fluid_opt.levels)?,
    };

    fluid_opt.write_to_file(args.db_path.join(CONFIG_FILENAME))?;
    db.close()?;

    info!(loaded, "database built");
    Ok(())
}
