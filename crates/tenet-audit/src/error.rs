// error.rs — Error types for the audit subsystem.
//
// Each variant maps to a specific failure mode of the violation log. The
// engine treats any of them on append as a persistence failure.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during log operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the log file.
    #[error("failed to open violation log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read an existing log file.
    #[error("failed to read violation log at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an entry to the log.
    #[error("failed to append entry: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize an entry.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A complete line in the middle of the log does not parse.
    #[error("corrupt record at line {line}: {reason}")]
    CorruptRecord { line: usize, reason: String },

    /// The log has been tampered with: the hash chain is broken.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },
}
