//! Crate-wide error taxonomy.
//!
//! Every fallible operation in ragforge returns [`RagError`]. The variants
//! map one-to-one onto the failure classes the pipeline distinguishes at its
//! orchestration boundary: configuration mistakes are fatal, format and input
//! errors surface directly, and transient downstream failures (model or store
//! unavailable, timeouts) are eligible for bounded retry via
//! [`crate::retry::with_retry`].

use thiserror::Error;

/// Errors produced by the ragforge pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid tunable (e.g. overlap >= window size). Fatal, never retried.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Unrecognized document format. Fails the one file, not its batch.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The embedding or completion model could not be reached or misbehaved.
    /// Transient; retried with bounded attempts.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The persistent store could not be reached or failed mid-operation.
    /// Transient; retried with bounded attempts.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Caller error (empty batch, oversized question). Surfaced directly.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Data-integrity error reported by the store. Surfaced directly.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A model or store call exceeded the configured deadline.
    #[error("operation '{operation}' timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },
}

impl RagError {
    /// Whether the orchestration boundary may retry the failed operation.
    ///
    /// Only transient downstream failures qualify; configuration, format,
    /// input, and integrity errors are surfaced on the first occurrence.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::ModelUnavailable(_)
                | RagError::StoreUnavailable(_)
                | RagError::Timeout { .. }
        )
    }
}
