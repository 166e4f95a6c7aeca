//! Item fetching from the overlay.
//!
//! An [`ItemFetcher`] retrieves opaque content (transaction sets, quorum
//! sets) by hash. It combines a content cache with per-hash [`Tracker`]s
//! that rotate through peers one at a time: if a peer answers DONT_HAVE we
//! move to the next candidate, and when the candidate list is exhausted it
//! is rebuilt after a linearly growing backoff.
//!
//! Transaction sets use a [`TxSetFetcherPair`]: a double-buffer of two
//! fetchers indexed by a single bit. At externalization the active side's
//! in-flight requests are cancelled, the roles flip, and the newly active
//! side starts empty while the retired side still holds items referenced by
//! statements validated against the just-closed slot.

use crate::gateway::{ItemKind, OverlayGateway};
use corral_common::{Hash256, PeerId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Configuration for item fetching.
#[derive(Debug, Clone)]
pub struct ItemFetcherConfig {
    /// How long to wait for a peer's reply before asking the next one.
    pub fetch_reply_timeout: Duration,
    /// Cap on the backoff multiplier applied when the peer list is
    /// rebuilt.
    pub max_rebuild_fetch_list: u32,
}

impl Default for ItemFetcherConfig {
    fn default() -> Self {
        Self {
            fetch_reply_timeout: Duration::from_millis(1500),
            max_rebuild_fetch_list: 10,
        }
    }
}

/// Decision produced when a tracker looks for the next peer to ask.
#[derive(Debug)]
enum NextPeer {
    Ask(PeerId),
    Wait(Duration),
}

/// Fetch state for a single item hash.
struct Tracker {
    config: ItemFetcherConfig,
    /// Peers already asked this round.
    peers_asked: HashSet<PeerId>,
    last_asked_peer: Option<PeerId>,
    fetch_start: Instant,
    last_ask_time: Option<Instant>,
    /// Earliest instant the next ask is allowed (set after a rebuild).
    backoff_until: Option<Instant>,
    num_list_rebuild: u32,
}

impl Tracker {
    fn new(config: ItemFetcherConfig) -> Self {
        Self {
            config,
            peers_asked: HashSet::new(),
            last_asked_peer: None,
            fetch_start: Instant::now(),
            last_ask_time: None,
            backoff_until: None,
            num_list_rebuild: 0,
        }
    }

    /// Record a DONT_HAVE. Returns true if it came from the peer we are
    /// currently waiting on.
    fn doesnt_have(&mut self, peer: &PeerId) -> bool {
        if self.last_asked_peer.as_ref() == Some(peer) {
            self.last_asked_peer = None;
            true
        } else {
            false
        }
    }

    /// Pick the next peer to ask, or the backoff to observe when every
    /// candidate has been tried.
    fn try_next_peer(&mut self, available_peers: &[PeerId]) -> NextPeer {
        self.last_asked_peer = None;

        let candidate = available_peers
            .iter()
            .find(|p| !self.peers_asked.contains(*p));

        if let Some(peer) = candidate {
            self.peers_asked.insert(peer.clone());
            self.last_asked_peer = Some(peer.clone());
            self.last_ask_time = Some(Instant::now());
            self.backoff_until = None;
            NextPeer::Ask(peer.clone())
        } else {
            self.num_list_rebuild += 1;
            self.peers_asked.clear();
            let wait = self.config.fetch_reply_timeout
                * self.num_list_rebuild.min(self.config.max_rebuild_fetch_list);
            self.backoff_until = Some(Instant::now() + wait);
            NextPeer::Wait(wait)
        }
    }

    /// Whether this tracker should ask a(nother) peer now.
    fn wants_ask(&self) -> bool {
        if let Some(until) = self.backoff_until {
            return Instant::now() >= until;
        }
        match self.last_ask_time {
            None => true,
            Some(at) => at.elapsed() >= self.config.fetch_reply_timeout,
        }
    }

    fn duration(&self) -> Duration {
        self.fetch_start.elapsed()
    }
}

/// Fetches opaque content by hash and caches what arrives.
pub struct ItemFetcher<V> {
    kind: ItemKind,
    config: ItemFetcherConfig,
    overlay: Arc<dyn OverlayGateway>,
    cache: RwLock<HashMap<Hash256, V>>,
    trackers: Mutex<HashMap<Hash256, Tracker>>,
}

impl<V: Clone> ItemFetcher<V> {
    pub fn new(kind: ItemKind, config: ItemFetcherConfig, overlay: Arc<dyn OverlayGateway>) -> Self {
        Self {
            kind,
            config,
            overlay,
            cache: RwLock::new(HashMap::new()),
            trackers: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an item, optionally starting a network fetch on a miss.
    ///
    /// On a miss with `ask_network`, a tracker is registered and the first
    /// candidate peer is asked immediately; subsequent peers are tried by
    /// [`process_pending`](Self::process_pending) as replies time out.
    pub fn fetch_item(&self, item_hash: &Hash256, ask_network: bool) -> Option<V> {
        if let Some(item) = self.cache.read().get(item_hash) {
            return Some(item.clone());
        }
        if !ask_network {
            return None;
        }

        let mut trackers = self.trackers.lock();
        if trackers.contains_key(item_hash) {
            // Already fetching; the existing tracker keeps rotating peers.
            return None;
        }

        trace!(kind = ?self.kind, item = %item_hash.to_hex_prefix(), "start fetching");
        let mut tracker = Tracker::new(self.config.clone());
        if let NextPeer::Ask(peer) = tracker.try_next_peer(&self.overlay.available_peers()) {
            self.overlay.request_item(&peer, item_hash, self.kind);
        }
        trackers.insert(*item_hash, tracker);
        None
    }

    /// Store an item under its content hash.
    ///
    /// Returns true iff at least one caller was waiting for it.
    pub fn recv_item(&self, item_hash: Hash256, item: V) -> bool {
        self.cache.write().insert(item_hash, item);

        let tracker = self.trackers.lock().remove(&item_hash);
        match tracker {
            Some(tracker) => {
                debug!(
                    kind = ?self.kind,
                    item = %item_hash.to_hex_prefix(),
                    elapsed = ?tracker.duration(),
                    "fetched item"
                );
                true
            }
            None => {
                trace!(kind = ?self.kind, item = %item_hash.to_hex_prefix(), "cached unrequested item");
                false
            }
        }
    }

    /// A peer denied possession of an item.
    ///
    /// If the denial came from the peer currently being waited on, the next
    /// candidate is asked immediately.
    pub fn doesnt_have(&self, item_hash: &Hash256, peer: &PeerId) {
        let mut trackers = self.trackers.lock();
        if let Some(tracker) = trackers.get_mut(item_hash) {
            if tracker.doesnt_have(peer) {
                trace!(
                    kind = ?self.kind,
                    item = %item_hash.to_hex_prefix(),
                    peer = %peer,
                    "peer denies item"
                );
                if let NextPeer::Ask(next) = tracker.try_next_peer(&self.overlay.available_peers())
                {
                    self.overlay.request_item(&next, item_hash, self.kind);
                }
            }
        }
    }

    /// Retry sweep: ask the next peer for every item whose current request
    /// timed out or whose backoff elapsed. Returns the number of requests
    /// sent.
    pub fn process_pending(&self) -> usize {
        let peers = self.overlay.available_peers();
        let mut sent = 0;
        let mut trackers = self.trackers.lock();
        for (hash, tracker) in trackers.iter_mut() {
            if tracker.wants_ask() {
                if let NextPeer::Ask(peer) = tracker.try_next_peer(&peers) {
                    self.overlay.request_item(&peer, hash, self.kind);
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Cancel all outstanding requests; cached items are kept.
    pub fn stop_fetching_all(&self) {
        let mut trackers = self.trackers.lock();
        if !trackers.is_empty() {
            debug!(kind = ?self.kind, count = trackers.len(), "cancelling outstanding fetches");
        }
        trackers.clear();
    }

    /// Drop all cached items and outstanding requests.
    pub fn clear(&self) {
        self.cache.write().clear();
        self.trackers.lock().clear();
    }

    /// Whether an item is currently being fetched.
    pub fn is_fetching(&self, item_hash: &Hash256) -> bool {
        self.trackers.lock().contains_key(item_hash)
    }

    /// Number of cached items.
    pub fn cache_size(&self) -> usize {
        self.cache.read().len()
    }
}

/// Double-buffered pair of transaction-set fetchers.
///
/// The active side serves all lookups; [`flip`](Self::flip) swaps the roles
/// at externalization so the previous generation's cache survives one more
/// slot of validation.
pub struct TxSetFetcherPair<V> {
    fetchers: [ItemFetcher<V>; 2],
    active: AtomicUsize,
}

impl<V: Clone> TxSetFetcherPair<V> {
    pub fn new(config: ItemFetcherConfig, overlay: Arc<dyn OverlayGateway>) -> Self {
        Self {
            fetchers: [
                ItemFetcher::new(ItemKind::TxSet, config.clone(), Arc::clone(&overlay)),
                ItemFetcher::new(ItemKind::TxSet, config, overlay),
            ],
            active: AtomicUsize::new(0),
        }
    }

    /// The fetcher serving the current slot.
    pub fn active(&self) -> &ItemFetcher<V> {
        &self.fetchers[self.active.load(Ordering::Acquire)]
    }

    /// The fetcher retaining the previous generation.
    pub fn retired(&self) -> &ItemFetcher<V> {
        &self.fetchers[1 - self.active.load(Ordering::Acquire)]
    }

    /// Swap active and retired.
    pub fn flip(&self) {
        self.active.fetch_xor(1, Ordering::AcqRel);
    }
}
