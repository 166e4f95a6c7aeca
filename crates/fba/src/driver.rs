//! Driver trait defining the callbacks the Herder provides to the kernel.
//!
//! The [`FbaDriver`] trait is the integration point between the FBA protocol
//! engine and the node: the engine is isolated from application logic and
//! delegates every policy decision through this trait. The driver decides
//! what a valid value looks like, which ballots deserve priority, and where
//! envelopes go when the engine wants them broadcast.
//!
//! # Asynchrony
//!
//! `validate_value`, `validate_ballot` and `retrieve_quorum_set` may depend
//! on content that has not been fetched from the overlay yet, so their
//! verdicts arrive through callbacks rather than return values. Exactly one
//! callback fires per request. Implementations must not block inside a
//! callback.

use crate::types::{FbaBallot, FbaEnvelope, FbaQuorumSet, NodeId, SlotIndex};
use corral_common::Hash256;
use std::cmp::Ordering;
use std::sync::Arc;

/// One-shot verdict for a validation request.
pub type ValidationCallback = Box<dyn FnOnce(bool) + Send + Sync>;

/// Verdict callback for an inbound envelope.
///
/// Shared (`Arc<dyn Fn>`) rather than one-shot: an envelope stashed for a
/// future slot is replayed through the kernel when that slot opens, and the
/// same callback accompanies it both times.
pub type EnvelopeCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Delivery callback for a quorum set lookup.
pub type QuorumSetCallback = Box<dyn FnOnce(Arc<FbaQuorumSet>) + Send + Sync>;

/// Callback interface the consensus driver implements for the FBA kernel.
pub trait FbaDriver: Send + Sync {
    /// Decide whether an opaque candidate value is acceptable for a slot.
    ///
    /// The verdict may be deferred until referenced content arrives.
    fn validate_value(
        &self,
        slot_index: SlotIndex,
        node_id: &NodeId,
        value: &[u8],
        cb: ValidationCallback,
    );

    /// Decide whether a ballot is acceptable for a slot.
    ///
    /// Non-king ballots are accepted on a delay rather than rejected; the
    /// verdict may therefore arrive well after the call.
    fn validate_ballot(
        &self,
        slot_index: SlotIndex,
        node_id: &NodeId,
        ballot: &FbaBallot,
        cb: ValidationCallback,
    );

    /// Total preorder over candidate values for a ballot round.
    ///
    /// Both values must already have passed [`validate_value`]; the kernel
    /// never compares unvalidated values.
    ///
    /// [`validate_value`]: Self::validate_value
    fn compare_values(
        &self,
        slot_index: SlotIndex,
        ballot_counter: u32,
        v1: &[u8],
        v2: &[u8],
    ) -> Ordering;

    /// A quorum has been heard from for the given ballot.
    fn ballot_did_hear_from_quorum(&self, slot_index: SlotIndex, ballot: &FbaBallot);

    /// Consensus reached: the slot externalized with the given value.
    fn value_externalized(&self, slot_index: SlotIndex, value: &[u8]);

    /// The kernel touched a node while processing a statement.
    fn node_touched(&self, node_id: NodeId);

    /// Look up a node's quorum set by hash, fetching it if necessary.
    fn retrieve_quorum_set(&self, node_id: &NodeId, qset_hash: Hash256, cb: QuorumSetCallback);

    /// Broadcast an envelope produced by the kernel.
    fn emit_envelope(&self, envelope: &FbaEnvelope);
}
