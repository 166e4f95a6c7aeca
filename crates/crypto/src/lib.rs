//! Ed25519 keys and SHA-256 hashing for corral.
//!
//! Everything consensus-critical that touches bytes on the wire goes
//! through this crate: content hashes are SHA-256 over the canonical
//! encoding, signatures are Ed25519 over the same bytes.

mod error;
mod hash;
mod keys;

pub use error::CryptoError;
pub use hash::{sha256, sha256_multi, Sha256Hasher};
pub use keys::{PublicKey, SecretKey, Signature};
