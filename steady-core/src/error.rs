//! Reconciliation error types.

use thiserror::Error;

/// Errors that end a reconciliation run.
///
/// Every variant is fatal: the run stops at the first one, and steps that
/// already succeeded are not rolled back.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Malformed input, detected before any network call.
    #[error("{0}")]
    InvalidInput(String),

    /// A named resource the run depends on does not exist remotely.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The API answered with a status other than the expected one.
    #[error("{action} failed with status {status}: {body}")]
    Upstream {
        action: String,
        status: u16,
        body: String,
    },

    /// The HTTP client could not complete the request.
    #[error("transport: {0}")]
    Transport(String),

    /// A response did not have the expected shape.
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ReconcileError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn decode(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
