//! Error taxonomy shared by every genta crate.
//!
//! Collaborator traits return `anyhow::Result` so backends can attach
//! context freely. The typed errors below travel inside those `anyhow`
//! values, and the worker pool downcasts them to decide whether a failure
//! is worth retrying without string matching.

use std::fmt;

use thiserror::Error;

/// Domain-level failures raised by stores and services.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller does not own the entity it is trying to read or change.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A collaborator is unreachable or not configured.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A failure that is expected to succeed on a later attempt.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request itself is malformed.
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` if retrying the same operation cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            DomainError::NotFound { .. }
                | DomainError::Forbidden(_)
                | DomainError::Conflict(_)
                | DomainError::Invalid(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound { .. })
    }
}

/// Errors that can occur when talking to a text-generation backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No credential is present for the backend.
    #[error("generation service not configured: {0}")]
    NotConfigured(String),

    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The API answered but produced no completion.
    #[error("empty completion from {0}")]
    EmptyCompletion(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    ///
    /// Only a missing backend is permanent. Failures of the generation call
    /// itself, including rejected keys and unknown models, go back to the
    /// queue as retryable.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProviderError::NotConfigured(_))
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Classify an opaque handler error.
///
/// Walks the `anyhow` cause chain looking for a typed genta error. Anything
/// unrecognised is treated as transient.
pub fn is_permanent_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<DomainError>() {
            return e.is_permanent();
        }
        if let Some(e) = cause.downcast_ref::<ProviderError>() {
            return e.is_permanent();
        }
        false
    })
}

/// Find a `DomainError` anywhere in an `anyhow` cause chain.
pub fn domain_error(err: &anyhow::Error) -> Option<&DomainError> {
    err.chain().find_map(|cause| cause.downcast_ref::<DomainError>())
}
