//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The bytes do not represent a valid Ed25519 public key.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// The input has the wrong length for the expected key material.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
