/// Compaction fault injection, used by schedulers to exercise their retry
/// paths against each error class without staging real filesystem
/// failures.
use crate::{Db, EngineError};

/// The error class the next `compact_files` call should fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionFault {
    /// Fail with an I/O error (terminal, never retried).
    Io,
    /// Fail with an invalid-argument error (terminal, never retried).
    InvalidArgument,
    /// Fail with a transient error (eligible for retry).
    Transient,
}

impl CompactionFault {
    pub(crate) fn into_error(self) -> EngineError {
        match self {
            CompactionFault::Io => {
                EngineError::Io(std::io::Error::other("injected io fault"))
            }
            CompactionFault::InvalidArgument => {
                EngineError::InvalidArgument("injected invalid-argument fault".into())
            }
            CompactionFault::Transient => {
                EngineError::Other("injected transient fault".into())
            }
        }
    }
}

impl Db {
    /// Arms a one-shot fault: the next `compact_files` call fails with the
    /// given class before touching any state. Faults queue in FIFO order.
    pub fn fail_next_compaction(&self, fault: CompactionFault) {
        self.faults.lock().push_back(fault);
    }
}
