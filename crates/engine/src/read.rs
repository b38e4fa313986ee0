/// Read path: point lookups across memtable and levels.
///
/// The memtable is checked first, then level-0 files newest to oldest,
/// then deeper levels in increasing level order. Within a level only files
/// whose key range covers the probe are consulted, and each file's filter
/// block is checked before any record I/O. First match wins: a shallower
/// placement is always at least as recent as a deeper one.
use std::sync::Arc;

use crate::table::TableReader;
use crate::{Db, EngineError};

impl Db {
    /// Looks up `key`, returning the stored value if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a run file read fails (corruption, I/O).
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        let candidates: Vec<Arc<TableReader>> = {
            let state = self.state.lock();

            if let Some(value) = state.mem.get(key) {
                return Ok(Some(value.to_vec()));
            }

            let mut readers = Vec::new();
            // Level 0: all files, newest first (ranges may overlap).
            for handle in &state.levels[0] {
                if handle.reader.covers(key) {
                    readers.push(Arc::clone(&handle.reader));
                }
            }
            // Deeper levels: ranges are disjoint within a level.
            for level in state.levels.iter().skip(1) {
                for handle in level {
                    if handle.reader.covers(key) {
                        readers.push(Arc::clone(&handle.reader));
                    }
                }
            }
            readers
        };

        let policy = self.options().filter_policy.as_deref();
        for reader in candidates {
            if let Some(value) = reader.get(key, policy)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
