//! Gateway error types

use thiserror::Error;

/// Errors reported by a data gateway
///
/// Cloneable so one failure can be fanned out to every affected listener.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The query or document path is malformed
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The target document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The session may not read or write the target
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backend cannot be reached right now
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The listener was closed by the backend
    #[error("Subscription closed")]
    Closed,
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
