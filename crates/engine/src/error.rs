/// Typed engine status.
///
/// The compaction scheduler branches on the error class: I/O and
/// invalid-argument failures are terminal for a task, anything else is
/// considered transient and may be retried. [`EngineError::kind`] collapses
/// the variants into those three classes.
use thiserror::Error;

/// Coarse error class used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem-level failure. Terminal, never retried.
    Io,
    /// Impossible arguments, typically stale file names from a racing
    /// compaction. Terminal, never retried.
    InvalidArgument,
    /// Anything else; eligible for retry.
    Other,
}

/// Errors produced by the storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller handed the engine arguments it cannot act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A run file failed checksum or framing validation.
    #[error("corrupt run file: {0}")]
    Corrupt(String),

    /// Any other non-ok condition.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// The retry class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Io(_) => ErrorKind::Io,
            EngineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            EngineError::Corrupt(_) | EngineError::Other(_) => ErrorKind::Other,
        }
    }

    /// True for filesystem-level failures.
    #[must_use]
    pub fn is_io(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    /// True for stale or impossible arguments.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }
}
