//! Logical view over the engine's physical layout.
//!
//! A *fluid run* is a set of engine files that together form one sorted
//! run; a *fluid level* is the collection of runs competing for the same
//! capacity slot in the size hierarchy. The controller rebuilds this view
//! from an engine metadata snapshot before every decision, so the structs
//! here are plain data with no locking of their own.

use engine::RunFileMetaData;
use std::collections::HashSet;

/// Maps an engine (physical) level to its 0-based fluid level.
///
/// Physical levels 0 and 1 both belong to fluid level 0. Deeper physical
/// levels are grouped `K + 1` at a time: `ceil((p - 1) / (K + 1)) - 1`.
#[must_use]
pub fn fluid_level_for_engine_level(engine_level: usize, k: usize) -> usize {
    if engine_level <= 1 {
        return 0;
    }
    (engine_level - 1).div_ceil(k + 1) - 1
}

/// The physical slot backing run `run_slot` of 0-based fluid level
/// `fluid_level`. Inverse of [`fluid_level_for_engine_level`] for
/// `fluid_level >= 1`; fluid level 0 runs live in physical levels 0 and 1
/// and have no forced slot.
///
/// # Panics
///
/// Panics if `fluid_level == 0` or `run_slot > k` (each level owns
/// `k + 1` slots).
#[must_use]
pub fn engine_level_for_run(fluid_level: usize, k: usize, run_slot: usize) -> usize {
    assert!(fluid_level >= 1, "fluid level 0 has no forced slots");
    assert!(run_slot <= k, "run slot {} exceeds width {}", run_slot, k);
    fluid_level * (k + 1) + 2 + run_slot
}

/// One sorted run: engine files with disjoint key ranges.
#[derive(Debug, Clone, Default)]
pub struct FluidRun {
    engine_level: usize,
    files: Vec<RunFileMetaData>,
    names: HashSet<String>,
}

impl FluidRun {
    /// Creates an empty run pinned to `engine_level`.
    #[must_use]
    pub fn new(engine_level: usize) -> Self {
        Self {
            engine_level,
            files: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// The physical level this run's files live on.
    #[must_use]
    pub fn engine_level(&self) -> usize {
        self.engine_level
    }

    /// True if the run holds a file with this name.
    #[must_use]
    pub fn contains(&self, file_name: &str) -> bool {
        self.names.contains(file_name)
    }

    /// Appends a file to the run. Returns `false` (and ignores the file)
    /// if a file of that name is already present.
    pub fn add_file(&mut self, file: RunFileMetaData) -> bool {
        if !self.names.insert(file.name.clone()) {
            return false;
        }
        self.files.push(file);
        true
    }

    /// The files forming this run.
    #[must_use]
    pub fn files(&self) -> &[RunFileMetaData] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total bytes across the run's files.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    /// True if any file of the run is an input of an in-flight merge.
    #[must_use]
    pub fn being_compacted(&self) -> bool {
        self.files.iter().any(|f| f.being_compacted)
    }
}

/// One fluid level: a set of runs.
#[derive(Debug, Clone, Default)]
pub struct FluidLevel {
    runs: Vec<FluidRun>,
}

impl FluidLevel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_run(&mut self, run: FluidRun) {
        self.runs.push(run);
    }

    /// Drops all runs; slot padding is re-added on the next rebuild.
    pub fn clear(&mut self) {
        self.runs.clear();
    }

    /// All runs, including empty padding slots.
    #[must_use]
    pub fn runs(&self) -> &[FluidRun] {
        &self.runs
    }

    /// Number of non-empty runs.
    #[must_use]
    pub fn size(&self) -> usize {
        self.runs.iter().filter(|r| !r.is_empty()).count()
    }

    /// Total bytes across all runs.
    #[must_use]
    pub fn size_in_bytes(&self) -> u64 {
        self.runs.iter().map(|r| r.size_bytes()).sum()
    }

    /// Runs that are non-empty and not currently being compacted — the
    /// population the saturation predicate counts.
    #[must_use]
    pub fn num_live_runs(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| !r.is_empty() && !r.being_compacted())
            .count()
    }

    /// True if any run holds a file with this name.
    #[must_use]
    pub fn contains(&self, file_name: &str) -> bool {
        self.runs.iter().any(|r| r.contains(file_name))
    }
}
