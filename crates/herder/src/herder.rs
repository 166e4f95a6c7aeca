//! The Herder: per-node FBA consensus driver.
//!
//! The Herder sits between the FBA protocol engine and the rest of the
//! node. It decides when to propose a new ledger, what to propose, whether
//! statements observed from peers are acceptable, and orchestrates the
//! asynchronous fetching of the content those statements reference.
//!
//! # Wiring
//!
//! The Herder owns the [`Mempool`], the item fetchers, the fetch gates and
//! every timer. It holds non-owning handles to its collaborators:
//!
//! - the FBA kernel through [`FbaKernel`], which calls back through the
//!   Herder's [`FbaDriver`] implementation;
//! - the ledger through [`LedgerGateway`];
//! - the overlay through [`OverlayGateway`].
//!
//! # Participation
//!
//! A node participates passively until the application reports itself
//! synced and the configured number of ledgers has closed. While passive it
//! verifies signatures only and emits nothing. A node without a validation
//! key stays reactive forever: it never triggers ledgers and never emits
//! envelopes attributed to itself.

use crate::config::HerderConfig;
use crate::error::HerderError;
use crate::fetch_gate::FetchGate;
use crate::gateway::{ItemKind, LedgerGateway, OverlayGateway};
use crate::item_fetcher::{ItemFetcher, ItemFetcherConfig, TxSetFetcherPair};
use crate::mempool::{AdmitResult, Mempool};
use crate::state::{NodeState, SyncTracker};
use crate::timers::{TimerEvents, TimerHandle, TimerManager};
use crate::tx_set::TxSetFrame;
use crate::validation::{
    ballot_counter_within_rate, compare_consensus_values, is_king, is_trusted,
};
use crate::Result;

use corral_common::{time, Hash256, PeerId};
use corral_fba::{
    ConsensusValue, EnvelopeCallback, FbaBallot, FbaDriver, FbaEnvelope, FbaKernel, FbaQuorumSet,
    LedgerHeader, NodeId, QuorumSetCallback, SignedValue, SlotIndex, Transaction,
    ValidationCallback,
};

use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Deferred-acceptance wait for a ballot round: half the round's timeout.
fn ballot_validation_delay(counter: u32) -> Duration {
    Duration::from_secs_f64(2f64.powi(counter.min(32) as i32) / 2.0)
}

/// Full FBA round timeout for a ballot counter, used to arm the bump timer.
fn fba_round_timeout(counter: u32) -> Duration {
    Duration::from_secs(1u64 << counter.min(32))
}

/// The per-node consensus driver.
pub struct Herder {
    config: HerderConfig,
    local_node_id: NodeId,

    kernel: Arc<dyn FbaKernel>,
    ledger: Arc<dyn LedgerGateway>,
    overlay: Arc<dyn OverlayGateway>,

    sync: RwLock<SyncTracker>,
    mempool: Mempool,

    tx_set_fetchers: TxSetFetcherPair<Arc<TxSetFrame>>,
    qset_fetcher: ItemFetcher<Arc<FbaQuorumSet>>,
    tx_set_gate: FetchGate<Arc<TxSetFrame>>,
    qset_gate: FetchGate<Arc<FbaQuorumSet>>,

    last_closed_ledger: RwLock<LedgerHeader>,
    /// When we last triggered consensus, for trigger spacing.
    last_trigger_at: RwLock<Instant>,
    /// Same instant as Unix seconds, for the ballot-counter rate limit.
    last_trigger_unix: RwLock<u64>,
    /// The value we are currently proposing, wire-encoded.
    current_value: RwLock<Option<Vec<u8>>>,

    /// Envelopes for future slots, replayed when their slot is triggered.
    future_envelopes: Mutex<HashMap<SlotIndex, Vec<(FbaEnvelope, EnvelopeCallback)>>>,
    /// Nodes with deferred validation pending, per ballot. Mirrors the
    /// timer task's pending set so v-blocking checks stay synchronous.
    ballot_requesters: Mutex<HashMap<FbaBallot, Vec<NodeId>>>,
    /// Last time the kernel touched each node.
    node_last_access: Mutex<HashMap<NodeId, Instant>>,

    timers: RwLock<Option<TimerHandle>>,
}

impl Herder {
    /// Create a Herder wired to its collaborators.
    ///
    /// Call [`start`](Self::start) and spawn the returned future before
    /// feeding the Herder any traffic; without the timer task, deferred
    /// validation and trigger scheduling cannot run.
    pub fn new(
        config: HerderConfig,
        kernel: Arc<dyn FbaKernel>,
        ledger: Arc<dyn LedgerGateway>,
        overlay: Arc<dyn OverlayGateway>,
    ) -> Self {
        let local_node_id = config
            .validation_secret
            .as_ref()
            .map(|secret| NodeId::from(secret.public_key()))
            .unwrap_or(NodeId([0u8; 32]));

        let herder = Self {
            local_node_id,
            kernel,
            tx_set_fetchers: TxSetFetcherPair::new(
                ItemFetcherConfig::default(),
                Arc::clone(&overlay),
            ),
            qset_fetcher: ItemFetcher::new(
                ItemKind::QuorumSet,
                ItemFetcherConfig::default(),
                Arc::clone(&overlay),
            ),
            tx_set_gate: FetchGate::new(),
            qset_gate: FetchGate::new(),
            sync: RwLock::new(SyncTracker::new(config.ledgers_to_wait)),
            mempool: Mempool::new(),
            last_closed_ledger: RwLock::new(LedgerHeader::default()),
            last_trigger_at: RwLock::new(Instant::now()),
            last_trigger_unix: RwLock::new(time::current_timestamp()),
            current_value: RwLock::new(None),
            future_envelopes: Mutex::new(HashMap::new()),
            ballot_requesters: Mutex::new(HashMap::new()),
            node_last_access: Mutex::new(HashMap::new()),
            timers: RwLock::new(None),
            ledger,
            overlay,
            config,
        };

        // Seed our own quorum set so statements referencing it never wait
        // on the network.
        let local_qset = Arc::new(herder.config.quorum_set.clone());
        herder.qset_fetcher.recv_item(local_qset.hash(), local_qset);

        herder
    }

    /// Create the timer task and hand back its future for spawning.
    pub fn start(self: &Arc<Self>) -> impl Future<Output = ()> + Send + 'static {
        let (handle, manager) = TimerManager::new(Arc::clone(self) as Arc<dyn TimerEvents>);
        *self.timers.write() = Some(handle);
        manager.run()
    }

    /// Stop timers and abandon in-flight fetches.
    pub fn shutdown(&self) {
        if let Some(handle) = self.timers.read().as_ref() {
            handle.shutdown();
        }
        self.tx_set_fetchers.active().stop_fetching_all();
        self.tx_set_fetchers.retired().stop_fetching_all();
        self.qset_fetcher.stop_fetching_all();
        self.tx_set_gate.clear();
        self.qset_gate.clear();
    }

    /// Our node identity (all zeroes in watcher mode).
    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    /// Whether this node can sign and propose values.
    pub fn is_validator(&self) -> bool {
        self.config.is_validator()
    }

    /// Whether the node participates actively in consensus.
    pub fn fully_synced(&self) -> bool {
        self.sync.read().fully_synced()
    }

    /// The candidate transaction pool.
    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Header of the last closed ledger as the Herder sees it.
    pub fn last_closed_ledger(&self) -> LedgerHeader {
        *self.last_closed_ledger.read()
    }

    /// The wire-encoded value we are currently proposing, if any.
    pub fn current_value(&self) -> Option<Vec<u8>> {
        self.current_value.read().clone()
    }

    /// Record the application's synchronization state.
    pub fn set_node_state(&self, state: NodeState) {
        self.sync.write().set_node_state(state);
    }

    /// Bootstrap a brand-new network from genesis.
    ///
    /// Requires a validation key and `start_new_network`; marks the node
    /// fully synced and triggers the first slot immediately.
    pub fn bootstrap(&self) -> Result<()> {
        if !self.config.is_validator() {
            return Err(HerderError::NotValidating);
        }
        if !self.config.start_new_network {
            return Err(HerderError::BootstrapForbidden);
        }

        let genesis = self.ledger.last_closed_ledger();
        info!(ledger_seq = genesis.ledger_seq, "bootstrapping new network");
        *self.last_closed_ledger.write() = genesis;
        self.sync.write().mark_synced();
        self.trigger_next_ledger();
        Ok(())
    }

    // --- inbound from overlay ---

    /// Admit a transaction into the mempool.
    pub fn recv_transaction(&self, tx: Transaction) -> AdmitResult {
        self.mempool.admit(tx, self.ledger.as_ref())
    }

    /// Receive a transaction set from the overlay (or from ourselves at
    /// trigger time).
    ///
    /// If anyone was waiting for it, its transactions are offered to the
    /// mempool best-effort and pending validations on its hash are run.
    pub fn recv_tx_set(&self, tx_set: TxSetFrame) {
        let tx_set = Arc::new(tx_set);
        let hash = tx_set.content_hash();

        if self
            .tx_set_fetchers
            .active()
            .recv_item(hash, Arc::clone(&tx_set))
        {
            for tx in tx_set.transactions() {
                let _ = self.recv_transaction(tx.clone());
            }
            self.tx_set_gate.release(&hash, tx_set);
        }
    }

    /// Receive a quorum set from the overlay.
    pub fn recv_fba_quorum_set(&self, quorum_set: FbaQuorumSet) {
        let quorum_set = Arc::new(quorum_set);
        let hash = quorum_set.hash();
        debug!(qset = %hash.to_hex_prefix(), "received quorum set");

        if self.qset_fetcher.recv_item(hash, Arc::clone(&quorum_set)) {
            self.qset_gate.release(&hash, quorum_set);
        }
    }

    /// A peer denied possession of a transaction set.
    pub fn doesnt_have_tx_set(&self, tx_set_hash: &Hash256, peer: &PeerId) {
        self.tx_set_fetchers.active().doesnt_have(tx_set_hash, peer);
    }

    /// A peer denied possession of a quorum set.
    pub fn doesnt_have_fba_quorum_set(&self, qset_hash: &Hash256, peer: &PeerId) {
        self.qset_fetcher.doesnt_have(qset_hash, peer);
    }

    /// Receive an envelope from the overlay.
    ///
    /// Once fully synced, envelopes outside the validity bracket around the
    /// last closed ledger are dropped, and envelopes for slots beyond the
    /// next one are stashed for replay when their slot is triggered. All
    /// accepted envelopes are forwarded to the kernel.
    pub fn recv_fba_envelope(&self, envelope: FbaEnvelope, cb: EnvelopeCallback) {
        let slot = envelope.statement.slot_index;

        if self.fully_synced() {
            let lcl = *self.last_closed_ledger.read();
            let bracket = self.config.ledger_validity_bracket;
            let min_ledger_seq = lcl.ledger_seq.saturating_sub(bracket);
            let max_ledger_seq = lcl.ledger_seq + bracket;

            if slot > max_ledger_seq || slot < min_ledger_seq {
                debug!(
                    slot,
                    lcl = lcl.ledger_seq,
                    "dropping envelope outside validity bracket"
                );
                return;
            }

            if slot > lcl.ledger_seq + 1 {
                trace!(slot, "stashing envelope for future slot");
                self.future_envelopes
                    .lock()
                    .entry(slot)
                    .or_default()
                    .push((envelope.clone(), Arc::clone(&cb)));
            }
        }

        self.kernel.receive_envelope(envelope, cb);
    }

    /// Periodic retry sweep for in-flight fetches.
    pub fn process_pending_fetches(&self) -> usize {
        self.tx_set_fetchers.active().process_pending() + self.qset_fetcher.process_pending()
    }

    // --- ledger lifecycle ---

    /// The ledger finished applying; a new last-closed header is in effect.
    ///
    /// Deferred ballot acceptances are moot once the slot moves, so all
    /// ballot validation timers are dropped without firing. Validating,
    /// fully-synced nodes schedule the next trigger so that triggers stay
    /// `exp_ledger_timespan` apart.
    pub fn ledger_closed(&self, ledger: LedgerHeader) {
        trace!(
            ledger_seq = ledger.ledger_seq,
            hash = %ledger.hash.to_hex_prefix(),
            "ledger closed"
        );

        *self.last_closed_ledger.write() = ledger;

        if let Some(handle) = self.timers.read().as_ref() {
            handle.clear_ballot_timers();
        }
        self.ballot_requesters.lock().clear();

        self.sync.write().ledger_closed();

        if !self.config.is_validator() {
            return;
        }
        if !self.fully_synced() {
            return;
        }

        let elapsed = self.last_trigger_at.read().elapsed();
        let delay = self.config.exp_ledger_timespan.saturating_sub(elapsed);
        if let Some(handle) = self.timers.read().as_ref() {
            handle.cancel_trigger();
            handle.schedule_trigger(delay);
        }
    }

    /// Propose the next ledger.
    ///
    /// Snapshots the mempool, caches the proposed set locally, signs the
    /// value and hands it to the kernel, then replays any stashed
    /// envelopes for the slot.
    fn trigger_next_ledger(&self) {
        let now_unix = time::current_timestamp();
        *self.last_trigger_at.write() = Instant::now();
        *self.last_trigger_unix.write() = now_unix;

        let lcl = *self.last_closed_ledger.read();
        let proposed = self.mempool.snapshot_all(lcl.hash);
        let tx_set_hash = proposed.content_hash();
        let tx_count = proposed.len();

        // Feed the proposal back through reception so it lands in the
        // active fetcher's cache and releases anyone already waiting on it.
        self.recv_tx_set(proposed);

        let Some(secret) = self.config.validation_secret.as_ref() else {
            return;
        };

        let slot = lcl.ledger_seq + 1;
        let close_time = now_unix.max(lcl.close_time + 1);
        let signed = SignedValue::sign(
            secret,
            ConsensusValue {
                tx_set_hash,
                close_time,
                base_fee: self.config.desired_base_fee,
            },
        );
        let value = signed.to_wire();
        *self.current_value.write() = Some(value.clone());

        debug!(
            slot,
            tx_count,
            tx_set = %tx_set_hash.to_hex_prefix(),
            prev = %lcl.hash.to_hex_prefix(),
            "triggering next ledger"
        );

        // If we're king the value gets validated; if not it is ignored.
        self.kernel.prepare_value(slot, &value, false);

        let pending = self.future_envelopes.lock().remove(&slot);
        if let Some(pending) = pending {
            debug!(slot, count = pending.len(), "replaying stashed envelopes");
            for (envelope, cb) in pending {
                self.recv_fba_envelope(envelope, cb);
            }
        }
    }

    fn fetch_tx_set(&self, tx_set_hash: &Hash256, ask_network: bool) -> Option<Arc<TxSetFrame>> {
        self.tx_set_fetchers
            .active()
            .fetch_item(tx_set_hash, ask_network)
    }
}

impl TimerEvents for Herder {
    fn on_trigger_ledger(&self) {
        self.trigger_next_ledger();
    }

    fn on_bump_ballot(&self, slot: SlotIndex, ballot: &FbaBallot) {
        let next_slot = self.last_closed_ledger.read().ledger_seq + 1;
        if slot != next_slot {
            warn!(slot, next_slot, "stale bump timer ignored");
            return;
        }

        let value = self.current_value.read().clone();
        if let Some(value) = value {
            debug!(slot, counter = ballot.counter, "bumping ballot");
            self.kernel.prepare_value(slot, &value, true);
        }
    }
}

impl FbaDriver for Herder {
    fn validate_value(
        &self,
        slot_index: SlotIndex,
        node_id: &NodeId,
        value: &[u8],
        cb: ValidationCallback,
    ) {
        let ballot = match SignedValue::from_wire(value) {
            Ok(b) => b,
            Err(_) => {
                debug!(slot = slot_index, node = %node_id, "value does not decode");
                return cb(false);
            }
        };

        if !ballot.verify() {
            debug!(slot = slot_index, node = %node_id, "value signature invalid");
            return cb(false);
        }

        // Checks relative to the last closed ledger apply only once we are
        // fully synced; passive nodes verify signatures only.
        let fully_synced = self.fully_synced();
        if fully_synced {
            let lcl = *self.last_closed_ledger.read();
            if lcl.ledger_seq + 1 != slot_index {
                debug!(
                    slot = slot_index,
                    expected = lcl.ledger_seq + 1,
                    "value for wrong slot"
                );
                return cb(false);
            }
            if ballot.value.close_time <= lcl.close_time {
                debug!(slot = slot_index, "value close time not after last close");
                return cb(false);
            }
        }

        let tx_set_hash = ballot.value.tx_set_hash;
        let slot = slot_index;
        let node = *node_id;
        let ledger = Arc::clone(&self.ledger);
        let validate = move |tx_set: Arc<TxSetFrame>| {
            if fully_synced && !tx_set.check_valid(ledger.as_ref()) {
                debug!(
                    slot,
                    node = %node,
                    tx_set = %tx_set.content_hash().to_hex_prefix(),
                    "invalid tx set"
                );
                return cb(false);
            }
            trace!(slot, node = %node, tx_set = %tx_set.content_hash().to_hex_prefix(), "value ok");
            cb(true)
        };

        match self.fetch_tx_set(&tx_set_hash, true) {
            Some(tx_set) => validate(tx_set),
            None => self.tx_set_gate.wait_on(tx_set_hash, Box::new(validate)),
        }
    }

    fn validate_ballot(
        &self,
        slot_index: SlotIndex,
        node_id: &NodeId,
        ballot: &FbaBallot,
        cb: ValidationCallback,
    ) {
        let b = match SignedValue::from_wire(&ballot.value) {
            Ok(b) => b,
            Err(_) => {
                debug!(slot = slot_index, node = %node_id, "ballot value does not decode");
                return cb(false);
            }
        };

        // Close time must not sit too far in the future.
        let now = time::current_timestamp();
        let max_slip = self.config.max_time_slip.as_secs();
        if b.value.close_time > now + max_slip {
            debug!(
                slot = slot_index,
                close_time = b.value.close_time,
                "close time too far ahead"
            );
            return cb(false);
        }

        // Reject counters the sender cannot have earned since our last
        // trigger; prevents counter-exhaustion attacks.
        let last_trigger = *self.last_trigger_unix.read();
        if !ballot_counter_within_rate(
            ballot.counter,
            now,
            last_trigger,
            max_slip,
            self.config.max_fba_timeout.as_secs(),
        ) {
            debug!(
                slot = slot_index,
                counter = ballot.counter,
                "ballot counter ahead of time"
            );
            return cb(false);
        }

        let desired = self.config.desired_base_fee;
        if b.value.base_fee < desired / 2 || b.value.base_fee > desired * 2 {
            debug!(
                slot = slot_index,
                base_fee = b.value.base_fee,
                "base fee out of range"
            );
            return cb(false);
        }

        // A pure watcher ignores envelopes attributed to itself.
        if !self.config.is_validator() && *node_id == self.local_node_id {
            return cb(false);
        }

        // The king of the round decides the tx set; we only check the
        // ballot plausibly comes from the king and a trusted proposer.
        let quorum = &self.config.quorum_set;
        let trusted = is_trusted(&b.node_id, quorum, &self.local_node_id);
        let king = is_king(slot_index, ballot.counter, &b.node_id, quorum);

        debug!(
            slot = slot_index,
            node = %node_id,
            proposer = %b.node_id,
            counter = ballot.counter,
            trusted,
            king,
            "validating ballot"
        );

        if king && trusted {
            return cb(true);
        }

        // Not the king (or not trusted): accept after half the round
        // timeout instead of rejecting outright.
        let handle = match self.timers.read().as_ref() {
            Some(handle) => handle.clone(),
            None => {
                error!("ballot validation deferred without a running timer task");
                return cb(false);
            }
        };

        {
            let mut requesters = self.ballot_requesters.lock();
            let entry = requesters.entry(ballot.clone()).or_default();
            if !entry.contains(node_id) {
                entry.push(*node_id);
            }
        }

        handle.schedule_ballot_timer(
            ballot.clone(),
            *node_id,
            ballot_validation_delay(ballot.counter),
            cb,
        );

        // If the nodes waiting on this ballot have become v-blocking we
        // cannot ignore the claim: rush every pending acceptance.
        let requesters = self
            .ballot_requesters
            .lock()
            .get(ballot)
            .cloned()
            .unwrap_or_default();
        if self.kernel.is_v_blocking(&requesters) {
            debug!(
                slot = slot_index,
                counter = ballot.counter,
                requesters = requesters.len(),
                "requesters are v-blocking, rushing acceptance"
            );
            self.ballot_requesters.lock().remove(ballot);
            handle.rush_ballot(ballot.clone());
        }
    }

    fn compare_values(
        &self,
        slot_index: SlotIndex,
        ballot_counter: u32,
        v1: &[u8],
        v2: &[u8],
    ) -> Ordering {
        let (b1, b2) = match (SignedValue::from_wire(v1), SignedValue::from_wire(v2)) {
            (Ok(b1), Ok(b2)) => (b1, b2),
            _ => {
                // The kernel only compares validated values, so this
                // cannot happen on a healthy node.
                error!(slot = slot_index, "comparing values that do not decode");
                return Ordering::Equal;
            }
        };

        debug_assert!(b1.verify() && b2.verify());

        compare_consensus_values(slot_index, ballot_counter, &b1, &b2)
    }

    fn ballot_did_hear_from_quorum(&self, slot_index: SlotIndex, ballot: &FbaBallot) {
        // Passive nodes don't time out FBA.
        if !self.fully_synced() {
            return;
        }

        let next_slot = self.last_closed_ledger.read().ledger_seq + 1;
        if slot_index != next_slot {
            warn!(slot = slot_index, next_slot, "quorum heard for unexpected slot");
            return;
        }

        if let Some(handle) = self.timers.read().as_ref() {
            handle.cancel_bump();
            handle.schedule_bump(slot_index, ballot.clone(), fba_round_timeout(ballot.counter));
        }
    }

    fn value_externalized(&self, slot_index: SlotIndex, value: &[u8]) {
        if let Some(handle) = self.timers.read().as_ref() {
            handle.cancel_bump();
        }

        let ballot = match SignedValue::from_wire(value) {
            Ok(b) => b,
            Err(_) => {
                // Validation should have made this impossible; the next
                // ledger close will heal whatever happened here.
                error!(slot = slot_index, "externalized value does not decode");
                return;
            }
        };

        let Some(externalized) = self.fetch_tx_set(&ballot.value.tx_set_hash, false) else {
            error!(
                slot = slot_index,
                tx_set = %ballot.value.tx_set_hash.to_hex_prefix(),
                "externalized tx set not found"
            );
            return;
        };

        info!(
            slot = slot_index,
            tx_set = %ballot.value.tx_set_hash.to_hex_prefix(),
            tx_count = externalized.len(),
            "value externalized"
        );

        // The old generation's fetches are moot; flip the double buffer so
        // the retired cache survives one more slot of validation.
        self.tx_set_fetchers.active().stop_fetching_all();
        self.tx_set_fetchers.flip();
        self.tx_set_fetchers.active().clear();

        // Triggers apply/sync; completion comes back via ledger_closed.
        self.ledger.externalize_value(&externalized);

        self.mempool.age_after_externalize(&externalized, |tx| {
            self.overlay.broadcast_transaction(tx);
        });

        // Evict nodes the kernel hasn't touched in a while.
        let now = Instant::now();
        let expiration = self.config.node_expiration;
        let stale: Vec<NodeId> = {
            let mut access = self.node_last_access.lock();
            let stale: Vec<NodeId> = access
                .iter()
                .filter(|(_, touched)| now.duration_since(**touched) > expiration)
                .map(|(node, _)| *node)
                .collect();
            for node in &stale {
                access.remove(node);
            }
            stale
        };
        for node in &stale {
            debug!(node = %node, "purging idle node");
            self.kernel.purge_node(node);
        }

        // Evict slots that fell out of the validity bracket.
        if slot_index > self.config.ledger_validity_bracket {
            self.kernel
                .purge_slots(slot_index - self.config.ledger_validity_bracket);
        }
    }

    fn node_touched(&self, node_id: NodeId) {
        self.node_last_access.lock().insert(node_id, Instant::now());
    }

    fn retrieve_quorum_set(&self, node_id: &NodeId, qset_hash: Hash256, cb: QuorumSetCallback) {
        debug!(node = %node_id, qset = %qset_hash.to_hex_prefix(), "retrieving quorum set");

        // Peers and node identities are unrelated; the whole overlay is
        // asked for the hash.
        match self.qset_fetcher.fetch_item(&qset_hash, true) {
            Some(quorum_set) => cb(quorum_set),
            None => self.qset_gate.wait_on(qset_hash, cb),
        }
    }

    fn emit_envelope(&self, envelope: &FbaEnvelope) {
        // Nothing leaves this node until it is fully synced.
        if !self.fully_synced() {
            debug!(
                slot = envelope.statement.slot_index,
                ledgers_to_wait = self.sync.read().ledgers_to_wait(),
                "suppressing envelope while catching up"
            );
            return;
        }

        self.overlay.broadcast_envelope(envelope);
    }
}
