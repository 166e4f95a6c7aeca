//! Shared primitive types for corral.

mod types;

pub mod time;

pub use types::{Hash256, PeerId};
