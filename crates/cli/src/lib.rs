//! # CLI — database builder and benchmark runner
//!
//! Two tools over the fluid compaction stack:
//!
//! - `db_builder` materializes a database of a chosen shape (by entry
//!   count or level count) via the bulk loader and writes the shape's
//!   configuration blob next to the data.
//! - `db_runner` reopens such a database with the live compaction
//!   controller installed and drives write / point-read phases against it.
//!
//! The [`driver`] module holds the shared wiring: translating
//! [`config::FluidOptions`] into engine options, installing the Monkey
//! filter policy and the right event listener, and running the workload
//! phases. The binaries are thin argument shells around it.

pub mod driver;

use tracing_subscriber::filter::LevelFilter;

/// Installs the global tracing subscriber. Verbosity: 0 = info,
/// 1 = debug, 2+ = trace.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}
