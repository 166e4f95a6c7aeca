//! Herder configuration.

use corral_crypto::SecretKey;
use corral_fba::FbaQuorumSet;
use std::time::Duration;

/// Configuration for the Herder.
///
/// A node without a `validation_secret` runs in watcher mode: it validates
/// and tracks consensus but never proposes values or emits envelopes
/// attributed to itself.
#[derive(Clone)]
pub struct HerderConfig {
    /// Secret key used to sign proposed values. `None` means watcher mode.
    pub validation_secret: Option<SecretKey>,

    /// The local quorum configuration (threshold plus trusted validators).
    pub quorum_set: FbaQuorumSet,

    /// Center of the accepted base-fee range. Proposed values outside
    /// `[desired_base_fee / 2, desired_base_fee * 2]` are rejected.
    pub desired_base_fee: u64,

    /// Permit bootstrapping a new network from genesis.
    pub start_new_network: bool,

    /// Accept envelopes only within this many slots of the last closed
    /// ledger (in both directions) once fully synced.
    pub ledger_validity_bracket: u64,

    /// Evict protocol state for nodes untouched for this long.
    pub node_expiration: Duration,

    /// Target spacing between consecutive ledger triggers.
    pub exp_ledger_timespan: Duration,

    /// Maximum tolerated clock skew for proposed close times.
    pub max_time_slip: Duration,

    /// Cap on the per-round FBA timeout used by the ballot-counter rate
    /// limit.
    pub max_fba_timeout: Duration,

    /// Ledgers to observe passively after the application reaches the
    /// synced state, before participating.
    pub ledgers_to_wait: u32,
}

impl Default for HerderConfig {
    fn default() -> Self {
        Self {
            validation_secret: None,
            quorum_set: FbaQuorumSet::new(0, Vec::new()),
            desired_base_fee: 10,
            start_new_network: false,
            ledger_validity_bracket: 10,
            node_expiration: Duration::from_secs(240),
            exp_ledger_timespan: Duration::from_secs(2),
            max_time_slip: Duration::from_secs(60),
            max_fba_timeout: Duration::from_secs(30),
            ledgers_to_wait: 3,
        }
    }
}

impl HerderConfig {
    /// Whether this node can sign and propose values.
    pub fn is_validator(&self) -> bool {
        self.validation_secret.is_some()
    }
}
