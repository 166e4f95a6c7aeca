//! FBA wire data model and interface traits.
//!
//! This crate is the boundary of the consensus driver: it defines the
//! structures that cross the wire (ballots, envelopes, quorum sets,
//! transactions) and the two traits that separate the Herder from the FBA
//! kernel proper:
//!
//! - [`FbaKernel`]: the protocol engine as seen by the Herder
//! - [`FbaDriver`]: the Herder as seen by the protocol engine
//!
//! All wire structures carry a canonical borsh encoding; content hashes are
//! SHA-256 over that encoding and signatures sign it directly.

mod driver;
mod kernel;
mod types;

pub use driver::{EnvelopeCallback, FbaDriver, QuorumSetCallback, ValidationCallback};
pub use kernel::FbaKernel;
pub use types::{
    AccountId, BallotCounter, ConsensusValue, FbaBallot, FbaEnvelope, FbaQuorumSet, FbaStatement,
    LedgerHeader, NodeId, SignedValue, SlotIndex, Transaction,
};
