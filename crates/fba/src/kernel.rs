//! Kernel trait: the FBA protocol engine as seen by the Herder.

use crate::driver::EnvelopeCallback;
use crate::types::{FbaEnvelope, NodeId, SlotIndex};

/// The surface of the FBA protocol engine the Herder drives.
///
/// The engine owns nomination, balloting and federated-voting state; the
/// Herder feeds it envelopes and values and reacts to the callbacks it
/// issues through [`FbaDriver`](crate::FbaDriver).
pub trait FbaKernel: Send + Sync {
    /// Hand an envelope to the protocol engine.
    ///
    /// The callback reports whether the envelope was accepted into protocol
    /// state.
    fn receive_envelope(&self, envelope: FbaEnvelope, cb: EnvelopeCallback);

    /// Propose (or re-propose with a bumped counter, when `force`) a value
    /// for a slot.
    fn prepare_value(&self, slot_index: SlotIndex, value: &[u8], force: bool);

    /// Whether the given nodes form a v-blocking set for the local quorum.
    fn is_v_blocking(&self, nodes: &[NodeId]) -> bool;

    /// Drop all protocol state for a node.
    fn purge_node(&self, node_id: &NodeId);

    /// Drop all protocol state for slots below the given index.
    fn purge_slots(&self, below: SlotIndex);
}
