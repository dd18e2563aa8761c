// error.rs — Error types for the policy subsystem.
//
// These cover loading and validating policy configuration. Policy
// *violations* are not errors: they are ordinary `EnforcerResult` values.

use std::path::PathBuf;

use thiserror::Error;

use crate::principle::Principle;

/// Errors that can occur while building or configuring a checklist.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A principle identifier outside P1..P7.
    #[error("unknown principle '{0}' (expected P1..P7)")]
    UnknownPrinciple(String),

    /// Two enforcers were registered for the same principle.
    #[error("an enforcer for {0} is already registered")]
    DuplicateEnforcer(Principle),

    /// A principle appears more than once in the configuration.
    #[error("principle {0} is configured more than once")]
    DuplicatePrinciple(Principle),

    /// An action-kind selector is not a valid glob.
    #[error("invalid kind pattern '{pattern}' for {principle}: {reason}")]
    InvalidPattern {
        principle: Principle,
        pattern: String,
        reason: String,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid policy configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or write the policy file.
    #[error("failed to access policy file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The policy file is not valid YAML for the expected schema.
    #[error("failed to parse policy YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
