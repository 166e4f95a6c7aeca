//! Transaction set frames.
//!
//! A [`TxSetFrame`] is the unit of consensus content: the set of
//! transactions a value proposes for the next ledger, tagged with the hash
//! of the ledger it builds on. The frame's identity is its content hash,
//! computed over the previous-ledger hash and the canonical encodings of
//! the members in hash order.

use crate::gateway::LedgerGateway;
use borsh::{BorshDeserialize, BorshSerialize};
use corral_common::Hash256;
use corral_crypto::Sha256Hasher;
use corral_fba::{AccountId, Transaction};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Wire form of a transaction set.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
struct TxSetWire {
    previous_ledger_hash: Hash256,
    transactions: Vec<Transaction>,
}

/// A set of candidate transactions for one ledger.
///
/// Members are kept sorted by full hash; the content hash is memoized on
/// first use.
#[derive(Debug)]
pub struct TxSetFrame {
    previous_ledger_hash: Hash256,
    transactions: Vec<Transaction>,
    hash: OnceLock<Hash256>,
}

impl TxSetFrame {
    /// Build a frame from unordered transactions.
    pub fn new(previous_ledger_hash: Hash256, mut transactions: Vec<Transaction>) -> Self {
        transactions.sort_by_cached_key(Transaction::full_hash);
        Self {
            previous_ledger_hash,
            transactions,
            hash: OnceLock::new(),
        }
    }

    /// The hash of the ledger this set builds on.
    pub fn previous_ledger_hash(&self) -> Hash256 {
        self.previous_ledger_hash
    }

    /// Members in hash order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Content hash: SHA-256 over the previous-ledger hash followed by the
    /// canonical encodings of the members in hash order.
    pub fn content_hash(&self) -> Hash256 {
        *self.hash.get_or_init(|| {
            let mut hasher = Sha256Hasher::new();
            hasher.update(self.previous_ledger_hash.as_bytes());
            for tx in &self.transactions {
                let bytes = borsh::to_vec(tx).expect("transaction encoding is infallible");
                hasher.update(&bytes);
            }
            hasher.finalize()
        })
    }

    /// Check the set against local ledger state.
    ///
    /// Valid iff the set builds on the last closed ledger, its members are
    /// in hash order, every member passes protocol validity, and each
    /// source account's balance covers the fees of all its transactions in
    /// the set.
    pub fn check_valid(&self, ledger: &dyn LedgerGateway) -> bool {
        if ledger.last_closed_ledger().hash != self.previous_ledger_hash {
            return false;
        }

        let mut account_txs: HashMap<AccountId, u64> = HashMap::new();
        let mut last_hash = Hash256::ZERO;
        for tx in &self.transactions {
            if tx.full_hash() < last_hash {
                return false;
            }
            last_hash = tx.full_hash();
            *account_txs.entry(tx.source).or_default() += 1;
        }

        let fee = ledger.tx_fee();
        for (source, count) in &account_txs {
            if ledger.account_balance(source) < count * fee {
                return false;
            }
        }

        self.transactions.iter().all(|tx| ledger.tx_valid(tx))
    }

    /// Deterministic apply order.
    ///
    /// Transactions from the same source keep their sequence-number order;
    /// within each round-robin level the order is each hash XOR'd with the
    /// set hash, so the apply order cannot be predicted when submitting.
    pub fn sort_for_apply(&self) -> Vec<Transaction> {
        let mut by_seq = self.transactions.clone();
        by_seq.sort_by_key(|tx| tx.seq_num);

        let mut levels: Vec<Vec<Transaction>> = Vec::new();
        let mut account_level: HashMap<AccountId, usize> = HashMap::new();
        for tx in by_seq {
            let level = account_level.entry(tx.source).or_insert(0);
            if *level >= levels.len() {
                levels.resize_with(*level + 1, Vec::new);
            }
            levels[*level].push(tx);
            *level += 1;
        }

        let set_hash = self.content_hash();
        let xor_key = |tx: &Transaction| -> [u8; 32] {
            let tx_hash = tx.full_hash();
            let mut mixed = [0u8; 32];
            for (i, byte) in mixed.iter_mut().enumerate() {
                *byte = set_hash.0[i] ^ tx_hash.0[i];
            }
            mixed
        };

        let mut out = Vec::with_capacity(self.transactions.len());
        for mut level in levels {
            level.sort_by_cached_key(|tx| xor_key(tx));
            out.extend(level);
        }
        out
    }

    /// Canonical wire encoding.
    pub fn to_wire(&self) -> Vec<u8> {
        let wire = TxSetWire {
            previous_ledger_hash: self.previous_ledger_hash,
            transactions: self.transactions.clone(),
        };
        borsh::to_vec(&wire).expect("tx set encoding is infallible")
    }

    /// Decode from wire bytes.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, borsh::io::Error> {
        let wire: TxSetWire = borsh::from_slice(bytes)?;
        Ok(Self::new(wire.previous_ledger_hash, wire.transactions))
    }
}
