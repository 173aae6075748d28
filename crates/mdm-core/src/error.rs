//! Shared error taxonomy for the MDM control plane

use thiserror::Error;

/// Result type alias using the control plane's unified error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the tenant registry, device registry and command
/// queue. HTTP and SCEP-specific mapping lives at the server boundary —
/// this enum only distinguishes the abstract kinds a caller needs to react
/// to (retry, surface to admin, treat as not-found, ...).
#[derive(Error, Debug)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Dependency(other.to_string()),
        }
    }
}
