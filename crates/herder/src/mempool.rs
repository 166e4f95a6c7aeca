//! Candidate transaction pool with generational eviction.
//!
//! Transactions waiting for consensus live in four generations, newest
//! first. Each externalized ledger shifts the survivors one generation
//! older; the oldest generation is a terminal holding pool that keeps
//! accumulating. A transaction therefore stays proposable for roughly four
//! slots before it settles in the holding pool, and the shift bounds how
//! much churn each close can cause.

use crate::gateway::LedgerGateway;
use crate::tx_set::TxSetFrame;
use corral_common::Hash256;
use corral_fba::Transaction;
use parking_lot::RwLock;
use tracing::{debug, trace};

/// Number of mempool generations, index 0 newest.
pub const GENERATION_COUNT: usize = 4;

/// Result of attempting to admit a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitResult {
    /// Transaction was admitted into the newest generation.
    Added,
    /// Transaction is already present in some generation.
    Duplicate,
    /// Transaction failed protocol-level validity.
    Invalid,
    /// The source account cannot cover fees for all its pending
    /// transactions plus this one.
    InsufficientBalance,
}

impl AdmitResult {
    pub fn is_added(&self) -> bool {
        matches!(self, AdmitResult::Added)
    }
}

/// The candidate transaction pool.
pub struct Mempool {
    generations: RwLock<[Vec<Transaction>; GENERATION_COUNT]>,
}

impl Mempool {
    pub fn new() -> Self {
        Self {
            generations: RwLock::new(Default::default()),
        }
    }

    /// Try to admit a transaction into the newest generation.
    ///
    /// Rejects duplicates across all generations, transactions the ledger
    /// deems invalid, and transactions whose source cannot pay
    /// `(pending_from_source + 1) * tx_fee`. Minimum reserve is not
    /// considered; an account may spend itself down by transacting.
    pub fn admit(&self, tx: Transaction, ledger: &dyn LedgerGateway) -> AdmitResult {
        let tx_hash = tx.full_hash();

        let mut num_others = 0u64;
        {
            let generations = self.generations.read();
            for list in generations.iter() {
                for old in list {
                    if old.full_hash() == tx_hash {
                        return AdmitResult::Duplicate;
                    }
                    if old.source == tx.source {
                        num_others += 1;
                    }
                }
            }
        }

        if !ledger.tx_valid(&tx) {
            debug!(tx = %tx_hash.to_hex_prefix(), "rejecting invalid transaction");
            return AdmitResult::Invalid;
        }

        if ledger.account_balance(&tx.source) < (num_others + 1) * ledger.tx_fee() {
            debug!(
                tx = %tx_hash.to_hex_prefix(),
                pending = num_others,
                "rejecting transaction: source cannot cover pending fees"
            );
            return AdmitResult::InsufficientBalance;
        }

        self.generations.write()[0].push(tx);
        trace!(tx = %tx_hash.to_hex_prefix(), "admitted transaction");
        AdmitResult::Added
    }

    /// Remove a transaction from whichever generation holds it.
    pub fn remove(&self, tx_hash: &Hash256) {
        let mut generations = self.generations.write();
        for list in generations.iter_mut() {
            if let Some(pos) = list.iter().position(|tx| tx.full_hash() == *tx_hash) {
                list.remove(pos);
                return;
            }
        }
    }

    /// Whether any generation holds the transaction.
    pub fn contains(&self, tx_hash: &Hash256) -> bool {
        self.generations
            .read()
            .iter()
            .flatten()
            .any(|tx| tx.full_hash() == *tx_hash)
    }

    /// Union of all generations, tagged with the previous-ledger hash.
    pub fn snapshot_all(&self, previous_ledger_hash: Hash256) -> TxSetFrame {
        let transactions: Vec<Transaction> =
            self.generations.read().iter().flatten().cloned().collect();
        TxSetFrame::new(previous_ledger_hash, transactions)
    }

    /// Age the pool after a ledger externalized.
    ///
    /// Every transaction in the externalized set is dropped from all
    /// generations. Generation 1's survivors are handed to `rebroadcast`
    /// before the shift (they have now missed one full ledger). Then each
    /// generation moves one step older; the oldest generation is not
    /// shifted out and keeps accumulating.
    pub fn age_after_externalize<F>(&self, externalized: &TxSetFrame, mut rebroadcast: F)
    where
        F: FnMut(&Transaction),
    {
        let mut generations = self.generations.write();

        for tx in externalized.transactions() {
            let tx_hash = tx.full_hash();
            for list in generations.iter_mut() {
                if let Some(pos) = list.iter().position(|t| t.full_hash() == tx_hash) {
                    list.remove(pos);
                    break;
                }
            }
        }

        for tx in &generations[1] {
            rebroadcast(tx);
        }

        for n in (1..GENERATION_COUNT).rev() {
            let moved = std::mem::take(&mut generations[n - 1]);
            generations[n].extend(moved);
        }

        debug!(
            sizes = ?generations.iter().map(Vec::len).collect::<Vec<_>>(),
            "aged mempool after externalize"
        );
    }

    /// Total transactions across all generations.
    pub fn len(&self) -> usize {
        self.generations.read().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-generation sizes, newest first.
    pub fn generation_sizes(&self) -> [usize; GENERATION_COUNT] {
        let generations = self.generations.read();
        std::array::from_fn(|i| generations[i].len())
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_fba::{AccountId, LedgerHeader};

    struct TestLedger {
        balance: u64,
        fee: u64,
    }

    impl LedgerGateway for TestLedger {
        fn externalize_value(&self, _tx_set: &TxSetFrame) {}

        fn tx_fee(&self) -> u64 {
            self.fee
        }

        fn last_closed_ledger(&self) -> LedgerHeader {
            LedgerHeader::default()
        }

        fn account_balance(&self, _account: &AccountId) -> u64 {
            self.balance
        }

        fn tx_valid(&self, _tx: &Transaction) -> bool {
            true
        }
    }

    fn tx(source: u8, seq: u64) -> Transaction {
        Transaction {
            source: AccountId([source; 32]),
            seq_num: seq,
            fee: 10,
            body: vec![seq as u8],
        }
    }

    #[test]
    fn test_admit_and_duplicate() {
        let pool = Mempool::new();
        let ledger = TestLedger {
            balance: 1000,
            fee: 10,
        };

        assert_eq!(pool.admit(tx(1, 1), &ledger), AdmitResult::Added);
        assert_eq!(pool.admit(tx(1, 1), &ledger), AdmitResult::Duplicate);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_admit_balance_scales_with_pending() {
        let pool = Mempool::new();
        // Balance covers exactly two pending fees
        let ledger = TestLedger {
            balance: 20,
            fee: 10,
        };

        assert_eq!(pool.admit(tx(1, 1), &ledger), AdmitResult::Added);
        assert_eq!(pool.admit(tx(1, 2), &ledger), AdmitResult::Added);
        assert_eq!(
            pool.admit(tx(1, 3), &ledger),
            AdmitResult::InsufficientBalance
        );

        // A different source is unaffected
        assert_eq!(pool.admit(tx(2, 1), &ledger), AdmitResult::Added);
    }

    #[test]
    fn test_remove_first_match() {
        let pool = Mempool::new();
        let ledger = TestLedger {
            balance: 1000,
            fee: 10,
        };
        let t = tx(1, 1);
        pool.admit(t.clone(), &ledger);
        assert!(pool.contains(&t.full_hash()));
        pool.remove(&t.full_hash());
        assert!(!pool.contains(&t.full_hash()));
    }

    #[test]
    fn test_snapshot_spans_generations() {
        let pool = Mempool::new();
        let ledger = TestLedger {
            balance: 1000,
            fee: 10,
        };
        pool.admit(tx(1, 1), &ledger);
        let empty = TxSetFrame::new(Hash256::ZERO, Vec::new());
        pool.age_after_externalize(&empty, |_| {});
        pool.admit(tx(1, 2), &ledger);

        let snapshot = pool.snapshot_all(Hash256::hash(b"prev"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.previous_ledger_hash(), Hash256::hash(b"prev"));
    }

    #[test]
    fn test_age_removes_rebroadcasts_and_shifts() {
        let pool = Mempool::new();
        let ledger = TestLedger {
            balance: 1000,
            fee: 10,
        };

        // G0 = [t1, t2], G1 = [t3]
        let t3 = tx(3, 3);
        pool.admit(t3.clone(), &ledger);
        let none = TxSetFrame::new(Hash256::ZERO, Vec::new());
        pool.age_after_externalize(&none, |_| {});
        let t1 = tx(1, 1);
        let t2 = tx(2, 2);
        pool.admit(t1.clone(), &ledger);
        pool.admit(t2.clone(), &ledger);
        assert_eq!(pool.generation_sizes(), [2, 1, 0, 0]);

        // Externalize a set containing t1; t3 sits in generation 1 and
        // should be rebroadcast before shifting.
        let externalized = TxSetFrame::new(Hash256::ZERO, vec![t1.clone()]);
        let mut rebroadcast = Vec::new();
        pool.age_after_externalize(&externalized, |tx| rebroadcast.push(tx.full_hash()));

        assert!(!pool.contains(&t1.full_hash()));
        assert_eq!(rebroadcast, vec![t3.full_hash()]);
        assert_eq!(pool.generation_sizes(), [0, 1, 1, 0]);
    }

    #[test]
    fn test_oldest_generation_accumulates() {
        let pool = Mempool::new();
        let ledger = TestLedger {
            balance: 1000,
            fee: 10,
        };
        let none = TxSetFrame::new(Hash256::ZERO, Vec::new());

        pool.admit(tx(1, 1), &ledger);
        for _ in 0..GENERATION_COUNT {
            pool.age_after_externalize(&none, |_| {});
        }
        pool.admit(tx(2, 2), &ledger);
        for _ in 0..GENERATION_COUNT {
            pool.age_after_externalize(&none, |_| {});
        }

        // Both settle in the terminal generation; nothing is lost.
        assert_eq!(pool.generation_sizes(), [0, 0, 0, 2]);
    }
}
