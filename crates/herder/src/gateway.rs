//! Capability traits connecting the Herder to the rest of the node.
//!
//! The Herder never owns the application; it holds non-owning handles to
//! the ledger and the overlay through these traits. Both are called from
//! Herder context and must not call back into the Herder synchronously.

use crate::tx_set::TxSetFrame;
use corral_common::{Hash256, PeerId};
use corral_fba::{AccountId, FbaEnvelope, LedgerHeader, Transaction};

/// The kind of content an item fetcher requests from peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Transaction set.
    TxSet,
    /// Quorum set.
    QuorumSet,
}

/// The ledger as seen by the Herder.
pub trait LedgerGateway: Send + Sync {
    /// Hand an externalized transaction set to the ledger for application.
    ///
    /// Triggers apply/sync; the ledger reports completion through
    /// `Herder::ledger_closed`.
    fn externalize_value(&self, tx_set: &TxSetFrame);

    /// The current per-transaction fee.
    fn tx_fee(&self) -> u64;

    /// Header of the most recently applied ledger.
    fn last_closed_ledger(&self) -> LedgerHeader;

    /// On-ledger balance of an account.
    fn account_balance(&self, account: &AccountId) -> u64;

    /// Protocol-level validity of a single transaction.
    fn tx_valid(&self, tx: &Transaction) -> bool;
}

/// The overlay network as seen by the Herder.
pub trait OverlayGateway: Send + Sync {
    /// Flood an envelope to all peers.
    fn broadcast_envelope(&self, envelope: &FbaEnvelope);

    /// Flood a single transaction to all peers.
    fn broadcast_transaction(&self, tx: &Transaction);

    /// Ask one peer for an item by content hash.
    fn request_item(&self, peer: &PeerId, hash: &Hash256, kind: ItemKind);

    /// Peers currently available for item requests.
    fn available_peers(&self) -> Vec<PeerId>;
}
