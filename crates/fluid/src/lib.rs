//! # Fluid — a configurable compaction controller
//!
//! Implements the Fluid LSM policy on top of the [`engine`] crate: a
//! single pair of knobs `K` (run width at interior levels) and `Z` (run
//! width at the last level) sweeps the layout between pure leveling
//! (`K = Z = 1`) and pure tiering (`K = Z = T - 1`), with every hybrid in
//! between.
//!
//! ## Pieces
//!
//! | Module          | Purpose                                             |
//! |-----------------|-----------------------------------------------------|
//! | [`model`]       | Logical view: engine files grouped into fluid runs  |
//! |                 | and fluid levels, plus the physical↔fluid mapping   |
//! | [`compactor`]   | Event-driven scheduler: reacts to flush events,     |
//! |                 | picks over-saturated levels, schedules merges with  |
//! |                 | bounded retry on transient failures                 |
//! | [`bulk_loader`] | Materializes a target shape directly, one run at a  |
//! |                 | time, pinning each run to its physical level        |
//!
//! ## Level geometry
//!
//! Fluid levels are a grouping over the engine's physical levels. Physical
//! levels 0 and 1 together form the first fluid level (each L0 file is its
//! own run; physical level 1 is one run). Past that, every fluid level
//! owns `K + 1` physical slots — one slot per concurrent run plus a spare
//! for in-flight merge outputs:
//!
//! ```text
//! physical:  0  1 | 2  3 | 4  5 | 6  7 | ...        (K = 1)
//! fluid:     ---- 1 ----- | - 2 - | - 3 - | ...
//! ```
//!
//! A fluid level at 0-based index `f` has byte capacity
//! `(T - 1) * T^(f+1) * B`; capacities grow by a factor of `T` per level.

pub mod bulk_loader;
pub mod compactor;
pub mod model;

pub use bulk_loader::{BulkLoader, BATCH_SIZE};
pub use compactor::{CompactionTask, FluidLsmCompactor, MAX_COMPACTION_RETRIES};
pub use model::{engine_level_for_run, fluid_level_for_engine_level, FluidLevel, FluidRun};

#[cfg(test)]
mod tests;
