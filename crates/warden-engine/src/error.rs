//! Decision engine error types.
//!
//! No error here is allowed to escape the decision path as a panic: every
//! failure mode maps to an explicit, fail-closed decision outcome. These
//! types surface only through administrative operations (reload, metrics)
//! and through the store/audit collaborator boundaries.

use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A policy or rule is malformed. Excluded from the index with a
    /// logged warning; never aborts a build.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A condition referenced an unsupported operator or malformed tree.
    /// Fails closed to `false` for the owning predicate.
    #[error("Evaluation error: {message}")]
    Evaluation {
        /// Description of the evaluation problem.
        message: String,
    },

    /// The decision deadline was exceeded mid-pipeline.
    #[error("Decision deadline exceeded")]
    Timeout,

    /// The policy store cannot be reached. The engine keeps serving the
    /// last good index snapshot.
    #[error("Policy store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the store failure.
        message: String,
    },

    /// An error occurred while reading from or writing to storage.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl EngineError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Evaluation` error.
    #[must_use]
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    /// Creates a new `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<warden_core::CoreError> for EngineError {
    fn from(err: warden_core::CoreError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

/// Type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
