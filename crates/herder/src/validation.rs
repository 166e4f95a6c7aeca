//! Statement validation policy helpers.
//!
//! Free functions implementing the deterministic parts of ballot and value
//! validation: king election, trust, the ballot-counter rate limit, and
//! the value comparator. The Herder composes these with its fetch-gated
//! asynchronous checks.

use corral_common::Hash256;
use corral_crypto::Sha256Hasher;
use corral_fba::{BallotCounter, FbaQuorumSet, NodeId, SignedValue, SlotIndex};
use std::cmp::Ordering;

/// Priority digest for a node in a given round.
///
/// SHA-256 over `slot_index` (8 bytes LE) ‖ `counter` (4 bytes LE) ‖ the
/// node's key bytes. A fresh king is coronated for every (slot, counter)
/// pair; the node with the smallest digest wins the round.
pub fn king_digest(slot_index: SlotIndex, counter: BallotCounter, node_id: &NodeId) -> Hash256 {
    let mut hasher = Sha256Hasher::new();
    hasher.update(&slot_index.to_le_bytes());
    hasher.update(&counter.to_le_bytes());
    hasher.update(node_id.as_bytes());
    hasher.finalize()
}

/// Whether `candidate` is the round king relative to our local quorum.
///
/// The candidate must hash at or below every validator in the quorum set;
/// anyone hashing strictly smaller dethrones it.
pub fn is_king(
    slot_index: SlotIndex,
    counter: BallotCounter,
    candidate: &NodeId,
    quorum: &FbaQuorumSet,
) -> bool {
    let candidate_digest = king_digest(slot_index, counter, candidate);
    quorum
        .validators
        .iter()
        .all(|v| candidate_digest <= king_digest(slot_index, counter, v))
}

/// Whether a value's proposer is trusted: a member of our quorum set, or
/// ourselves.
pub fn is_trusted(candidate: &NodeId, quorum: &FbaQuorumSet, local_node: &NodeId) -> bool {
    candidate == local_node || quorum.validators.iter().any(|v| v == candidate)
}

/// Ballot-counter rate limit.
///
/// A counter of `c` implies the sender sat through the cumulative FBA
/// timeout series `Σ_{i<c} min(max_timeout, 2^i)` since our last trigger.
/// Ballots claiming more elapsed rounds than wall-clock time (plus the
/// tolerated slip) allows are rejected; this caps the counter an attacker
/// can make us evaluate. The summation short-circuits on the same
/// inequality so oversized counters cost bounded work.
///
/// All arguments are Unix seconds.
pub fn ballot_counter_within_rate(
    counter: BallotCounter,
    now: u64,
    last_trigger: u64,
    max_time_slip: u64,
    max_fba_timeout: u64,
) -> bool {
    let deadline = now.saturating_add(max_time_slip);
    let mut sum_timeouts = 0u64;
    for i in 0..counter {
        if deadline < last_trigger.saturating_add(sum_timeouts) {
            break;
        }
        let step = if i < 63 { 1u64 << i } else { u64::MAX };
        sum_timeouts = sum_timeouts.saturating_add(step.min(max_fba_timeout));
    }
    deadline >= last_trigger.saturating_add(sum_timeouts)
}

/// Total preorder over decoded candidate values for one round.
///
/// The round king's value sorts first: primary key is the proposer's
/// [`king_digest`], ascending. Distinct values from the same proposer fall
/// back to the lexicographic order of the value fields.
///
/// Both values must already be signature-verified; the kernel only
/// compares validated values.
pub fn compare_consensus_values(
    slot_index: SlotIndex,
    counter: BallotCounter,
    b1: &SignedValue,
    b2: &SignedValue,
) -> Ordering {
    let d1 = king_digest(slot_index, counter, &b1.node_id);
    let d2 = king_digest(slot_index, counter, &b2.node_id);
    d1.cmp(&d2).then_with(|| b1.value.cmp(&b2.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_common::Hash256;
    use corral_crypto::SecretKey;
    use corral_fba::ConsensusValue;

    fn node(id: u8) -> NodeId {
        NodeId([id; 32])
    }

    fn quorum(ids: &[u8]) -> FbaQuorumSet {
        FbaQuorumSet::new(ids.len() as u32, ids.iter().map(|id| node(*id)).collect())
    }

    #[test]
    fn test_exactly_one_king_per_round() {
        let qset = quorum(&[1, 2, 3, 4]);
        for slot in 1..5u64 {
            for counter in 0..4u32 {
                let kings: Vec<&NodeId> = qset
                    .validators
                    .iter()
                    .filter(|v| is_king(slot, counter, v, &qset))
                    .collect();
                assert_eq!(kings.len(), 1, "slot {slot} counter {counter}");
            }
        }
    }

    #[test]
    fn test_king_changes_with_round() {
        let qset = quorum(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let king_for = |slot: u64, counter: u32| {
            qset.validators
                .iter()
                .find(|v| is_king(slot, counter, v, &qset))
                .copied()
                .unwrap()
        };

        // With eight candidates and independent digests per round, some
        // round in this range must crown a different king.
        let first = king_for(1, 0);
        let changed = (0..16u32).any(|c| king_for(1, c) != first)
            || (1..16u64).any(|s| king_for(s, 0) != first);
        assert!(changed);
    }

    #[test]
    fn test_king_is_smallest_digest() {
        let qset = quorum(&[1, 2, 3]);
        let king = qset
            .validators
            .iter()
            .find(|v| is_king(7, 2, v, &qset))
            .unwrap();
        let king_digest_value = king_digest(7, 2, king);
        for v in &qset.validators {
            assert!(king_digest_value <= king_digest(7, 2, v));
        }
    }

    #[test]
    fn test_trusted_members_and_self() {
        let qset = quorum(&[1, 2]);
        let local = node(9);
        assert!(is_trusted(&node(1), &qset, &local));
        assert!(is_trusted(&local, &qset, &local));
        assert!(!is_trusted(&node(3), &qset, &local));
    }

    #[test]
    fn test_rate_limit_rejects_oversized_counter() {
        // Just triggered: nothing beyond the slip window has elapsed
        let now = 1_000_000;
        assert!(!ballot_counter_within_rate(200, now, now, 5, 30));
    }

    #[test]
    fn test_rate_limit_accepts_earned_counter() {
        // 10s since trigger, 5s slip: counter 3 needs 1+2+4=7s
        let now = 1_000_010;
        let last_trigger = 1_000_000;
        assert!(ballot_counter_within_rate(3, now, last_trigger, 5, 30));
        // counter 5 needs 1+2+4+8+16=31s
        assert!(!ballot_counter_within_rate(5, now, last_trigger, 5, 30));
    }

    #[test]
    fn test_rate_limit_caps_per_round_timeout() {
        // With the cap at 2, counter 10 needs 1+2+2*8=19s
        let last_trigger = 1_000_000;
        assert!(ballot_counter_within_rate(
            10,
            last_trigger + 19,
            last_trigger,
            0,
            2
        ));
        assert!(!ballot_counter_within_rate(
            10,
            last_trigger + 18,
            last_trigger,
            0,
            2
        ));
    }

    #[test]
    fn test_rate_limit_zero_counter_always_passes() {
        assert!(ballot_counter_within_rate(0, 0, u64::MAX, 0, 30));
    }

    fn signed(seed: u8, close_time: u64) -> SignedValue {
        SignedValue::sign(
            &SecretKey::from_seed(&[seed; 32]),
            ConsensusValue {
                tx_set_hash: Hash256::hash(b"set"),
                close_time,
                base_fee: 10,
            },
        )
    }

    #[test]
    fn test_compare_prioritizes_king() {
        let a = signed(1, 100);
        let b = signed(2, 100);

        let expected = king_digest(1, 0, &a.node_id).cmp(&king_digest(1, 0, &b.node_id));
        assert_eq!(compare_consensus_values(1, 0, &a, &b), expected);
        assert_eq!(compare_consensus_values(1, 0, &b, &a), expected.reverse());
    }

    #[test]
    fn test_compare_tie_break_is_antisymmetric() {
        // Same proposer, different values: falls through to value order
        let secret = SecretKey::from_seed(&[3u8; 32]);
        let a = SignedValue::sign(
            &secret,
            ConsensusValue {
                tx_set_hash: Hash256::hash(b"set"),
                close_time: 100,
                base_fee: 10,
            },
        );
        let b = SignedValue::sign(
            &secret,
            ConsensusValue {
                tx_set_hash: Hash256::hash(b"set"),
                close_time: 101,
                base_fee: 10,
            },
        );

        assert_eq!(compare_consensus_values(1, 0, &a, &b), Ordering::Less);
        assert_eq!(compare_consensus_values(1, 0, &b, &a), Ordering::Greater);
        assert_eq!(compare_consensus_values(1, 0, &a, &a), Ordering::Equal);
    }
}
