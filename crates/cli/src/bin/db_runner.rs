//! Drives workload phases against a database built by `db_builder`.
//!
//! ```text
//! db_runner /tmp/db -w 100000 -r 10000 -e 10000 -v 1
//! ```
//!
//! The fluid configuration is read from the blob `db_builder` left in the
//! database directory; the live compaction controller is installed so the
//! write phase exercises the event-driven scheduling path.

use anyhow::Result;
use clap::Parser;
use cli::driver::{self, DriverConfig};
use config::{FluidOptions, CONFIG_FILENAME};
use datagen::UniformGenerator;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "db_runner",
    about = "Run write and point-read phases against a fluid LSM database"
)]
struct Args {
    /// Path to the database directory.
    db_path: PathBuf,

    /// Entries to write through the live controller.
    #[arg(short = 'w', long = "writes", default_value_t = 0)]
    writes: usize,

    /// Point reads with keys from the data distribution.
    #[arg(short = 'r', long = "non-empty-reads", default_value_t = 0)]
    non_empty_reads: usize,

    /// Point reads with keys guaranteed absent.
    #[arg(short = 'e', long = "empty-reads", default_value_t = 0)]
    empty_reads: usize,

    /// Physical levels the engine is opened with.
    #[arg(long = "max-engine-levels", default_value_t = 100)]
    max_engine_levels: usize,

    /// Background executor threads.
    #[arg(long = "parallelism", default_value_t = 1)]
    parallelism: usize,

    /// RNG seed for the workload generator.
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,

    /// Verbosity: 0 = info, 1 = debug, 2 = trace.
    #[arg(short = 'v', long = "verbose", default_value_t = 0)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    cli::init_logging(args.verbose);

    let fluid_opt = FluidOptions::from_file(args.db_path.join(CONFIG_FILENAME))?;
    fluid_opt.validate()?;

    let driver_cfg = DriverConfig {
        max_engine_levels: args.max_engine_levels,
        parallelism: args.parallelism,
    };

    info!(path = %args.db_path.display(), "opening database");
    let (db, compactor) = driver::open_with_controller(&args.db_path, &fluid_opt, &driver_cfg)?;
    let mut generator = UniformGenerator::new(args.seed);

    if args.writes > 0 {
        driver::write_phase(
            &db,
            &compactor,
            &mut generator,
            args.writes,
            fluid_opt.entry_size,
        )?;
    }
    if args.non_empty_reads > 0 {
        driver::read_phase(&db, &mut generator, args.non_empty_reads)?;
    }
    if args.empty_reads > 0 {
        driver::empty_read_phase(&db, &mut generator, args.empty_reads)?;
    }

    db.close()?;
    info!("done");
    Ok(())
}
