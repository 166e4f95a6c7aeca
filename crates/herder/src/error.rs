//! Error types for Herder operations.

use thiserror::Error;

/// Errors that can occur during Herder operations.
///
/// Validation verdicts never travel as errors; they are delivered through
/// the callbacks attached to each request. Errors cover lifecycle misuse
/// and internal failures only.
#[derive(Debug, Error)]
pub enum HerderError {
    /// Operation requires a validation key but the node is a watcher.
    #[error("not in validating state")]
    NotValidating,

    /// Bootstrap requested without `start_new_network`.
    #[error("bootstrap requires start_new_network")]
    BootstrapForbidden,

    /// An opaque blob failed to decode as the expected wire structure.
    #[error("decode failed: {0}")]
    Decode(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}
