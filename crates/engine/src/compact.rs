/// Compaction primitive: merge a named set of input files into a target
/// level.
///
/// `compact_files` is the engine's only way to move data between levels.
/// Inputs are validated and latched (`being_compacted`) under the state
/// lock, merged newest-wins outside the lock, split into output files at
/// the configured size limit, and installed atomically. Inputs that are
/// already latched, unknown names, or an output range that would overlap
/// live files at the target level are `InvalidArgument` — the caller's
/// selection raced another merge and must pick again from fresh metadata.
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::filter::FilterContext;
use crate::table::{record_size, TableIter, TableReader, TableWriter};
use crate::{CompactOptions, CompactionJobInfo, Db, EngineError, TableHandle, DEFAULT_CF_NAME};

impl Db {
    /// Merges `input_files` and installs the result at `output_level`.
    ///
    /// Blocks until the merge completes. On success the inputs are deleted
    /// and `on_compaction_completed` fires; on failure the inputs are
    /// unlatched and remain live.
    pub fn compact_files(
        &self,
        compact_options: &CompactOptions,
        input_files: &[String],
        output_level: usize,
    ) -> Result<(), EngineError> {
        if let Some(fault) = self.faults.lock().pop_front() {
            warn!(?fault, "compact_files failing via injected fault");
            return Err(fault.into_error());
        }

        if input_files.is_empty() {
            return Err(EngineError::InvalidArgument(
                "compact_files requires at least one input".into(),
            ));
        }
        if output_level >= self.options().num_levels {
            return Err(EngineError::InvalidArgument(format!(
                "output level {} out of range (num_levels {})",
                output_level,
                self.options().num_levels
            )));
        }

        let inputs = self.latch_inputs(input_files, output_level)?;

        let merged = self.merge_and_install(compact_options, &inputs, input_files, output_level);

        let output_names = match merged {
            Ok(names) => names,
            Err(e) => {
                self.unlatch_inputs(input_files);
                return Err(e);
            }
        };

        // Remove the consumed files from disk; the state no longer
        // references them.
        for name in input_files {
            let _ = std::fs::remove_file(self.path().join(name));
        }

        debug!(
            inputs = input_files.len(),
            outputs = output_names.len(),
            output_level,
            "compaction installed"
        );

        let info = CompactionJobInfo {
            cf_name: DEFAULT_CF_NAME.to_string(),
            input_files: input_files.to_vec(),
            output_files: output_names,
            output_level,
        };
        if let Some(db) = self.strong_self() {
            for listener in &self.options().listeners {
                listener.on_compaction_completed(&db, &info);
            }
        }
        Ok(())
    }

    /// Validates the input set and marks every file `being_compacted`.
    fn latch_inputs(
        &self,
        input_files: &[String],
        output_level: usize,
    ) -> Result<Vec<Arc<TableReader>>, EngineError> {
        let mut state = self.state.lock();

        let mut located: Vec<(usize, usize)> = Vec::with_capacity(input_files.len());
        for name in input_files {
            let mut found = None;
            'levels: for (level, handles) in state.levels.iter().enumerate() {
                for (idx, handle) in handles.iter().enumerate() {
                    if handle.reader.name() == name {
                        found = Some((level, idx));
                        break 'levels;
                    }
                }
            }
            let (level, idx) = found.ok_or_else(|| {
                EngineError::InvalidArgument(format!("{} is not a live run file", name))
            })?;
            if state.levels[level][idx].being_compacted {
                return Err(EngineError::InvalidArgument(format!(
                    "{} is already being compacted",
                    name
                )));
            }
            located.push((level, idx));
        }

        // The merged output spans the union of the input ranges; it must
        // not overlap a live file at the target level that is not itself
        // an input.
        let smallest = located
            .iter()
            .map(|&(l, i)| state.levels[l][i].reader.smallest_key())
            .min()
            .unwrap_or_default()
            .to_vec();
        let largest = located
            .iter()
            .map(|&(l, i)| state.levels[l][i].reader.largest_key())
            .max()
            .unwrap_or_default()
            .to_vec();

        for handle in &state.levels[output_level] {
            let name = handle.reader.name();
            if input_files.iter().any(|f| f == name) {
                continue;
            }
            let disjoint = handle.reader.largest_key() < smallest.as_slice()
                || largest.as_slice() < handle.reader.smallest_key();
            if !disjoint {
                return Err(EngineError::InvalidArgument(format!(
                    "output range overlaps {} at level {}",
                    name, output_level
                )));
            }
        }

        let mut readers = Vec::with_capacity(located.len());
        for (level, idx) in located {
            state.levels[level][idx].being_compacted = true;
            readers.push(Arc::clone(&state.levels[level][idx].reader));
        }
        Ok(readers)
    }

    /// Clears the `being_compacted` latch after a failed merge.
    fn unlatch_inputs(&self, input_files: &[String]) {
        let mut state = self.state.lock();
        for handles in state.levels.iter_mut() {
            for handle in handles.iter_mut() {
                if input_files.iter().any(|f| f == handle.reader.name()) {
                    handle.being_compacted = false;
                }
            }
        }
    }

    /// Runs the merge, writes size-split outputs, and swaps them into the
    /// state. Returns the output file names.
    fn merge_and_install(
        &self,
        compact_options: &CompactOptions,
        inputs: &[Arc<TableReader>],
        input_files: &[String],
        output_level: usize,
    ) -> Result<Vec<String>, EngineError> {
        let limit = compact_options.output_file_size_limit.max(1);
        let mut merge = KWayMerge::new(inputs)?;

        let mut outputs: Vec<(String, Arc<TableReader>)> = Vec::new();
        let mut writer: Option<(String, std::path::PathBuf, TableWriter)> = None;

        let result: Result<(), EngineError> = (|| {
            while let Some((key, value)) = merge.next_entry()? {
                let roll = writer.as_ref().is_some_and(|(_, _, w)| {
                    w.entry_count() > 0 && w.data_size() + record_size(&key, &value) > limit
                });
                if roll {
                    if let Some((name, path, w)) = writer.take() {
                        w.finish()?;
                        let reader = Arc::new(TableReader::open(&path)?);
                        outputs.push((name, reader));
                    }
                }
                if writer.is_none() {
                    let number = self.allocate_file_number();
                    let name = Self::run_file_name(number);
                    let path = self.path().join(&name);
                    let builder = self.options().filter_policy.as_ref().map(|p| {
                        p.builder_for_context(&FilterContext {
                            level_at_creation: Some(output_level),
                        })
                    });
                    writer = Some((name, path.clone(), TableWriter::create(&path, builder)?));
                }
                if let Some((_, _, w)) = writer.as_mut() {
                    w.add(&key, &value)?;
                }
            }
            if let Some((name, path, w)) = writer.take() {
                w.finish()?;
                let reader = Arc::new(TableReader::open(&path)?);
                outputs.push((name, reader));
            }
            Ok(())
        })();

        if let Err(e) = result {
            if let Some((_, _, w)) = writer.take() {
                w.abandon();
            }
            for (name, _) in &outputs {
                let _ = std::fs::remove_file(self.path().join(name));
            }
            return Err(e);
        }

        let mut state = self.state.lock();
        for handles in state.levels.iter_mut() {
            handles.retain(|h| !input_files.iter().any(|f| f == h.reader.name()));
        }
        let mut output_names = Vec::with_capacity(outputs.len());
        for (name, reader) in outputs {
            state.manifest.add(name.clone(), output_level);
            state.levels[output_level].push(TableHandle {
                reader,
                being_compacted: false,
            });
            output_names.push(name);
        }
        state.manifest.remove_files(input_files);
        state.manifest.save()?;

        Ok(output_names)
    }
}

// ---------------------------------------------------------------- merge

/// Entry staged in the merge heap. Ordered so the smallest key surfaces
/// first; among equal keys the most recently written file wins.
struct HeapEntry {
    key: Vec<u8>,
    value: Vec<u8>,
    recency: u64,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: reverse the key ordering, then prefer the newer file.
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.recency.cmp(&other.recency))
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Streaming k-way merge over run-file cursors, newest-wins on duplicate
/// keys.
struct KWayMerge {
    cursors: Vec<TableIter>,
    recency: Vec<u64>,
    heap: BinaryHeap<HeapEntry>,
}

impl KWayMerge {
    fn new(inputs: &[Arc<TableReader>]) -> Result<Self, EngineError> {
        let mut cursors = Vec::with_capacity(inputs.len());
        let mut recency = Vec::with_capacity(inputs.len());
        let mut heap = BinaryHeap::new();

        for (source, reader) in inputs.iter().enumerate() {
            let mut cursor = reader.iter()?;
            let rec = reader.file_number();
            if let Some(first) = cursor.next() {
                let (key, value) = first?;
                heap.push(HeapEntry {
                    key,
                    value,
                    recency: rec,
                    source,
                });
            }
            cursors.push(cursor);
            recency.push(rec);
        }

        Ok(Self {
            cursors,
            recency,
            heap,
        })
    }

    /// Returns the next `(key, value)` in ascending key order, resolving
    /// duplicates toward the newest source.
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, EngineError> {
        let Some(top) = self.heap.pop() else {
            return Ok(None);
        };
        self.advance(top.source)?;

        // The heap ordering put the newest duplicate on top; drain the
        // stale ones.
        while let Some(peek) = self.heap.peek() {
            if peek.key != top.key {
                break;
            }
            let stale = self
                .heap
                .pop()
                .unwrap_or_else(|| unreachable!("peeked entry vanished"));
            self.advance(stale.source)?;
        }

        Ok(Some((top.key, top.value)))
    }

    fn advance(&mut self, source: usize) -> Result<(), EngineError> {
        if let Some(next) = self.cursors[source].next() {
            let (key, value) = next?;
            self.heap.push(HeapEntry {
                key,
                value,
                recency: self.recency[source],
                source,
            });
        }
        Ok(())
    }
}
