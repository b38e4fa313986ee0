/// Write path: `put()`, `flush()`, and the internal level-0 run writer.
///
/// Every write lands in the memtable; once the buffered bytes reach the
/// write-buffer threshold the memtable is flushed to a new level-0 run
/// file and listeners are notified with the backpressure flags derived
/// from the L0 file count.
use std::sync::Arc;
use tracing::debug;

use crate::filter::FilterContext;
use crate::table::{TableReader, TableWriter};
use crate::{Db, EngineError, FlushJobInfo, TableHandle, DEFAULT_CF_NAME, MAX_KEY_SIZE, MAX_VALUE_SIZE};

impl Db {
    /// Inserts a key-value pair, flushing the memtable first if it has
    /// reached the write-buffer threshold.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for empty or oversized keys/values and
    /// propagates I/O failures from an automatic flush.
    pub fn put(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), EngineError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() {
            return Err(EngineError::InvalidArgument("key must not be empty".into()));
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(EngineError::InvalidArgument(format!(
                "key too large: {} bytes (max {})",
                key.len(),
                MAX_KEY_SIZE
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(EngineError::InvalidArgument(format!(
                "value too large: {} bytes (max {})",
                value.len(),
                MAX_VALUE_SIZE
            )));
        }

        let needs_flush = {
            let mut state = self.state.lock();
            state.mem.put(key, value);
            state.mem.approx_size() >= self.write_buffer_size()
        };

        if needs_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes the memtable to a new level-0 run file and fires
    /// `on_flush_completed`. A no-op when the memtable is empty.
    pub fn flush(&self) -> Result<(), EngineError> {
        let Some(info) = self.write_level0_run()? else {
            return Ok(());
        };
        if let Some(db) = self.strong_self() {
            for listener in &self.options().listeners {
                listener.on_flush_completed(&db, &info);
            }
        }
        Ok(())
    }

    /// Writes the current memtable to level 0 without notifying listeners.
    /// Returns `None` when there was nothing to flush.
    pub(crate) fn write_level0_run(&self) -> Result<Option<FlushJobInfo>, EngineError> {
        let mem = {
            let mut state = self.state.lock();
            if state.mem.is_empty() {
                return Ok(None);
            }
            std::mem::take(&mut state.mem)
        };

        let number = self.allocate_file_number();
        let name = Self::run_file_name(number);
        let file_path = self.path().join(&name);

        let write_result = (|| {
            let builder = self.options().filter_policy.as_ref().map(|p| {
                p.builder_for_context(&FilterContext {
                    level_at_creation: Some(0),
                })
            });
            let mut writer = TableWriter::create(&file_path, builder)?;
            for (key, value) in mem.iter() {
                writer.add(key, value)?;
            }
            writer.finish()
        })();

        if let Err(e) = write_result {
            // Put the buffered entries back so nothing acknowledged is
            // dropped; entries written since the take stay authoritative.
            let mut state = self.state.lock();
            for (key, value) in mem.iter() {
                if state.mem.get(key).is_none() {
                    state.mem.put(key.to_vec(), value.to_vec());
                }
            }
            return Err(e);
        }

        let reader = Arc::new(TableReader::open(&file_path)?);
        let entries = reader.num_entries();

        let l0_count = {
            let mut state = self.state.lock();
            state.levels[0].insert(
                0,
                TableHandle {
                    reader,
                    being_compacted: false,
                },
            );
            state.manifest.add(name.clone(), 0);
            state.manifest.save()?;
            state.levels[0].len()
        };

        let opts = self.options();
        debug!(
            file = %name,
            entries,
            l0_files = l0_count,
            "flushed memtable to level 0"
        );

        Ok(Some(FlushJobInfo {
            cf_name: DEFAULT_CF_NAME.to_string(),
            file_name: name,
            triggered_writes_slowdown: l0_count >= opts.level0_slowdown_writes_trigger,
            triggered_writes_stop: l0_count >= opts.level0_stop_writes_trigger,
        }))
    }
}
