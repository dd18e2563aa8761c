// error.rs — Error types for the compliance engine.
//
// Decisions are never errors: `before_action` and `after_action` always
// return a CheckOutcome. These errors come from task lifecycle calls and
// from opening a project.

use thiserror::Error;

use tenet_audit::AuditError;
use tenet_policy::PolicyError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The violation log failed.
    #[error("violation log error: {0}")]
    Audit(#[from] AuditError),

    /// The policy could not be loaded or the checklist could not be built.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// No compliance state exists for the task.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// A thread panicked while holding the engine lock.
    #[error("compliance engine lock poisoned")]
    LockPoisoned,

    /// A report file operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize a report.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
