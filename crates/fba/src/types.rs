//! Wire data model for FBA consensus.

use borsh::{BorshDeserialize, BorshSerialize};
use corral_common::Hash256;
use corral_crypto::{PublicKey, SecretKey, Signature};
use std::fmt;

/// A consensus decision position, identified with a ledger sequence number.
pub type SlotIndex = u64;

/// Per-slot ballot round counter.
pub type BallotCounter = u32;

/// A validator's public-key identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Create from raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Interpret the identity as an Ed25519 verifying key.
    pub fn public_key(&self) -> Result<PublicKey, corral_crypto::CryptoError> {
        PublicKey::from_bytes(&self.0)
    }
}

impl From<PublicKey> for NodeId {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

/// A transaction source account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", hex::encode(&self.0[..4]))
    }
}

/// A candidate transaction.
///
/// The body is opaque to the consensus driver; execution semantics belong to
/// the ledger. Only the source, sequence number and fee participate in
/// admission policy.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub source: AccountId,
    pub seq_num: u64,
    pub fee: u64,
    pub body: Vec<u8>,
}

impl Transaction {
    /// Content hash over the canonical encoding of the whole transaction.
    ///
    /// Two transactions with identical bodies but different sources or
    /// sequence numbers hash differently.
    pub fn full_hash(&self) -> Hash256 {
        Hash256::hash_borsh(self).expect("transaction encoding is infallible")
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("source", &self.source)
            .field("seq_num", &self.seq_num)
            .field("fee", &self.fee)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// The payload a round king proposes for a slot.
///
/// Ordering is lexicographic over (tx_set_hash, close_time, base_fee); the
/// comparator uses it as the final tie-break between distinct values.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshSerialize, BorshDeserialize,
)]
pub struct ConsensusValue {
    /// Content hash of the proposed transaction set.
    pub tx_set_hash: Hash256,
    /// Proposed close time (Unix seconds).
    pub close_time: u64,
    /// Proposed base fee.
    pub base_fee: u64,
}

/// A [`ConsensusValue`] bound to its proposer by signature.
///
/// This is the opaque value carried inside [`FbaBallot`]s: the proposer
/// signs the canonical encoding of the inner value with the key named by
/// `node_id`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedValue {
    pub node_id: NodeId,
    pub signature: Signature,
    pub value: ConsensusValue,
}

impl SignedValue {
    /// Sign a value, binding it to the signer's identity.
    pub fn sign(secret: &SecretKey, value: ConsensusValue) -> Self {
        let bytes = borsh::to_vec(&value).expect("value encoding is infallible");
        Self {
            node_id: secret.public_key().into(),
            signature: secret.sign(&bytes),
            value,
        }
    }

    /// Verify the inner signature against `node_id`.
    pub fn verify(&self) -> bool {
        let Ok(key) = self.node_id.public_key() else {
            return false;
        };
        let Ok(bytes) = borsh::to_vec(&self.value) else {
            return false;
        };
        key.verify(&bytes, &self.signature).is_ok()
    }

    /// Canonical wire encoding.
    pub fn to_wire(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("value encoding is infallible")
    }

    /// Decode from wire bytes.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(bytes)
    }
}

/// A ballot: a round counter and an opaque value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct FbaBallot {
    pub counter: BallotCounter,
    pub value: Vec<u8>,
}

/// The statement inside an envelope.
///
/// Only `slot_index` is interpreted by the Herder; the rest belongs to the
/// protocol engine.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FbaStatement {
    pub slot_index: SlotIndex,
    pub node_id: NodeId,
    pub ballot: FbaBallot,
    pub quorum_set_hash: Hash256,
}

/// A signed statement exchanged between nodes.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FbaEnvelope {
    pub statement: FbaStatement,
    pub signature: Signature,
}

/// A node's local quorum configuration.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FbaQuorumSet {
    pub threshold: u32,
    pub validators: Vec<NodeId>,
}

impl FbaQuorumSet {
    pub fn new(threshold: u32, validators: Vec<NodeId>) -> Self {
        Self {
            threshold,
            validators,
        }
    }

    /// Identity hash over the canonical encoding.
    pub fn hash(&self) -> Hash256 {
        Hash256::hash_borsh(self).expect("quorum set encoding is infallible")
    }
}

/// Header of the most recently applied ledger, as seen by the Herder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct LedgerHeader {
    pub ledger_seq: SlotIndex,
    pub close_time: u64,
    pub hash: Hash256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_value_roundtrip() {
        let secret = SecretKey::from_seed(&[3u8; 32]);
        let value = ConsensusValue {
            tx_set_hash: Hash256::hash(b"set"),
            close_time: 1234,
            base_fee: 10,
        };
        let signed = SignedValue::sign(&secret, value);
        assert!(signed.verify());

        let wire = signed.to_wire();
        let back = SignedValue::from_wire(&wire).unwrap();
        assert_eq!(signed, back);
        assert!(back.verify());
    }

    #[test]
    fn test_signed_value_rejects_tamper() {
        let secret = SecretKey::from_seed(&[4u8; 32]);
        let mut signed = SignedValue::sign(
            &secret,
            ConsensusValue {
                tx_set_hash: Hash256::ZERO,
                close_time: 1,
                base_fee: 10,
            },
        );
        signed.value.close_time = 2;
        assert!(!signed.verify());
    }

    #[test]
    fn test_signed_value_rejects_wrong_node() {
        let signer = SecretKey::from_seed(&[5u8; 32]);
        let other = SecretKey::from_seed(&[6u8; 32]);
        let mut signed = SignedValue::sign(
            &signer,
            ConsensusValue {
                tx_set_hash: Hash256::ZERO,
                close_time: 1,
                base_fee: 10,
            },
        );
        signed.node_id = other.public_key().into();
        assert!(!signed.verify());
    }

    #[test]
    fn test_consensus_value_ordering() {
        let a = ConsensusValue {
            tx_set_hash: Hash256::from_bytes([1u8; 32]),
            close_time: 10,
            base_fee: 10,
        };
        let b = ConsensusValue {
            tx_set_hash: Hash256::from_bytes([1u8; 32]),
            close_time: 11,
            base_fee: 10,
        };
        let c = ConsensusValue {
            tx_set_hash: Hash256::from_bytes([2u8; 32]),
            close_time: 1,
            base_fee: 10,
        };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_quorum_set_hash_is_stable() {
        let qset = FbaQuorumSet::new(2, vec![NodeId([1u8; 32]), NodeId([2u8; 32])]);
        assert_eq!(qset.hash(), qset.hash());

        let reordered = FbaQuorumSet::new(2, vec![NodeId([2u8; 32]), NodeId([1u8; 32])]);
        assert_ne!(qset.hash(), reordered.hash());
    }

    #[test]
    fn test_transaction_full_hash_distinguishes_fields() {
        let tx = Transaction {
            source: AccountId([9u8; 32]),
            seq_num: 1,
            fee: 10,
            body: vec![1, 2, 3],
        };
        let mut tx2 = tx.clone();
        tx2.seq_num = 2;
        assert_ne!(tx.full_hash(), tx2.full_hash());
    }
}
