//! Centralized error types for the Lookout workspace.

use thiserror::Error;

/// Top-level error enum. Variants map to the ways an access check can fail
/// before a descriptor is available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LookoutError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type LookoutResult<T> = Result<T, LookoutError>;
