//! Error types for privacy-guard

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the privacy monitor
#[derive(Debug, Error)]
pub enum GuardError {
    /// Rules file does not exist (fatal at load time; there is no default ruleset)
    #[error("Rules file not found: {0}")]
    RulesNotFound(PathBuf),

    /// Rules file exists but is not a valid rules document
    #[error("Malformed rules document '{path}': {reason}")]
    RulesMalformed {
        path: PathBuf,
        reason: String,
    },

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure while touching the event log or rules file
    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Event store backend failure
    #[error("Store error: {0}")]
    Store(String),
}

impl GuardError {
    /// Attach a human-readable context string to an I/O failure.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GuardError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for privacy-guard operations
pub type Result<T> = std::result::Result<T, GuardError>;
