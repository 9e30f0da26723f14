//! Error taxonomy for workload invocations
//!
//! Decode and validation failures abort the current invocation. Profiling
//! failures live in [`crate::profile::ProfileError`] and never abort one.

use thiserror::Error;

/// Errors surfaced to the caller of a single invocation
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// The input payload is not a valid JSON request object
    #[error("Failed to decode request: {0}")]
    Decode(#[source] serde_json::Error),

    /// A field decoded fine but its value is outside the allowed range
    #[error("Invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// Engine tunables are out of range
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// The summary could not be encoded as a response
    #[error("Failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl WorkloadError {
    /// Build an `InvalidParameter` error for `field`
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field, if this is a validation error
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidParameter { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for invocation operations
pub type Result<T> = std::result::Result<T, WorkloadError>;
