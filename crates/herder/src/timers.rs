//! Timer management for the consensus cadence.
//!
//! One background task owns every Herder timer:
//!
//! - the **trigger timer**: fires once to propose the next ledger,
//! - the **bump timer**: fires once to re-prepare the current value with a
//!   bumped ballot counter after hearing from a quorum,
//! - the **ballot validation timers**: deferred acceptance of non-king
//!   ballots, keyed by `(ballot, requesting node)`, each carrying its own
//!   verdict callback.
//!
//! Commands reach the task through a channel; the task sleeps until the
//! earliest deadline and fires whatever is due. Cancellation is a command
//! like any other: a cancelled timer's callback never runs. Rushing a
//! ballot is the one exception where callbacks run early, with an
//! accepting verdict.

use corral_fba::{FbaBallot, NodeId, SlotIndex, ValidationCallback};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Commands sent to the timer task.
pub enum TimerCommand {
    /// Arm the ledger trigger timer, replacing any prior arming.
    ScheduleTrigger { delay: Duration },
    /// Disarm the ledger trigger timer.
    CancelTrigger,
    /// Arm the ballot bump timer, replacing any prior arming.
    ScheduleBump {
        slot: SlotIndex,
        ballot: FbaBallot,
        delay: Duration,
    },
    /// Disarm the ballot bump timer.
    CancelBump,
    /// Arm a deferred-acceptance timer for one (ballot, requester) pair.
    ScheduleBallotTimer {
        ballot: FbaBallot,
        requester: NodeId,
        delay: Duration,
        cb: ValidationCallback,
    },
    /// Fire every pending callback for a ballot with `true`, now.
    RushBallot { ballot: FbaBallot },
    /// Drop all ballot timers without firing their callbacks.
    ClearBallotTimers,
    /// Stop the task; everything pending is dropped silently.
    Shutdown,
}

/// Expiration callbacks delivered by the timer task.
pub trait TimerEvents: Send + Sync {
    /// The ledger trigger timer fired.
    fn on_trigger_ledger(&self);

    /// The ballot bump timer fired.
    fn on_bump_ballot(&self, slot: SlotIndex, ballot: &FbaBallot);
}

/// Handle for sending commands to the timer task.
#[derive(Clone)]
pub struct TimerHandle {
    sender: mpsc::UnboundedSender<TimerCommand>,
}

impl TimerHandle {
    pub fn schedule_trigger(&self, delay: Duration) {
        let _ = self.sender.send(TimerCommand::ScheduleTrigger { delay });
    }

    pub fn cancel_trigger(&self) {
        let _ = self.sender.send(TimerCommand::CancelTrigger);
    }

    pub fn schedule_bump(&self, slot: SlotIndex, ballot: FbaBallot, delay: Duration) {
        let _ = self.sender.send(TimerCommand::ScheduleBump {
            slot,
            ballot,
            delay,
        });
    }

    pub fn cancel_bump(&self) {
        let _ = self.sender.send(TimerCommand::CancelBump);
    }

    pub fn schedule_ballot_timer(
        &self,
        ballot: FbaBallot,
        requester: NodeId,
        delay: Duration,
        cb: ValidationCallback,
    ) {
        let _ = self.sender.send(TimerCommand::ScheduleBallotTimer {
            ballot,
            requester,
            delay,
            cb,
        });
    }

    pub fn rush_ballot(&self, ballot: FbaBallot) {
        let _ = self.sender.send(TimerCommand::RushBallot { ballot });
    }

    pub fn clear_ballot_timers(&self) {
        let _ = self.sender.send(TimerCommand::ClearBallotTimers);
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(TimerCommand::Shutdown);
    }
}

struct BallotEntry {
    expires_at: Instant,
    cb: ValidationCallback,
}

/// The timer task. Create with [`TimerManager::new`], then spawn
/// [`run`](Self::run) on the runtime.
pub struct TimerManager {
    events: Arc<dyn TimerEvents>,
    receiver: mpsc::UnboundedReceiver<TimerCommand>,
    trigger_at: Option<Instant>,
    bump: Option<(Instant, SlotIndex, FbaBallot)>,
    ballot_timers: HashMap<(FbaBallot, NodeId), Vec<BallotEntry>>,
}

impl TimerManager {
    pub fn new(events: Arc<dyn TimerEvents>) -> (TimerHandle, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            TimerHandle { sender },
            Self {
                events,
                receiver,
                trigger_at: None,
                bump: None,
                ballot_timers: HashMap::new(),
            },
        )
    }

    /// Run until shutdown, firing whatever comes due.
    pub async fn run(mut self) {
        debug!("timer manager started");
        loop {
            let next = self.next_deadline();
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(TimerCommand::ScheduleTrigger { delay }) => {
                            trace!(delay_ms = delay.as_millis() as u64, "arming trigger timer");
                            self.trigger_at = Some(Instant::now() + delay);
                        }
                        Some(TimerCommand::CancelTrigger) => {
                            self.trigger_at = None;
                        }
                        Some(TimerCommand::ScheduleBump { slot, ballot, delay }) => {
                            trace!(slot, counter = ballot.counter, delay_ms = delay.as_millis() as u64, "arming bump timer");
                            self.bump = Some((Instant::now() + delay, slot, ballot));
                        }
                        Some(TimerCommand::CancelBump) => {
                            self.bump = None;
                        }
                        Some(TimerCommand::ScheduleBallotTimer { ballot, requester, delay, cb }) => {
                            self.ballot_timers
                                .entry((ballot, requester))
                                .or_default()
                                .push(BallotEntry { expires_at: Instant::now() + delay, cb });
                        }
                        Some(TimerCommand::RushBallot { ballot }) => {
                            self.rush_ballot(&ballot);
                        }
                        Some(TimerCommand::ClearBallotTimers) => {
                            let dropped = self.ballot_timers.len();
                            self.ballot_timers.clear();
                            if dropped > 0 {
                                debug!(dropped, "cleared ballot validation timers");
                            }
                        }
                        Some(TimerCommand::Shutdown) | None => {
                            info!("timer manager shutting down");
                            break;
                        }
                    }
                }
                _ = Self::sleep_until_or_forever(next) => {
                    self.fire_due();
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut next = self.trigger_at;
        if let Some((at, _, _)) = &self.bump {
            next = Some(next.map_or(*at, |n| n.min(*at)));
        }
        for entry in self.ballot_timers.values().flatten() {
            next = Some(next.map_or(entry.expires_at, |n| n.min(entry.expires_at)));
        }
        next
    }

    async fn sleep_until_or_forever(deadline: Option<Instant>) {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    }

    fn fire_due(&mut self) {
        let now = Instant::now();

        if self.trigger_at.is_some_and(|at| at <= now) {
            self.trigger_at = None;
            trace!("trigger timer fired");
            self.events.on_trigger_ledger();
        }

        if self.bump.as_ref().is_some_and(|(at, _, _)| *at <= now) {
            let (_, slot, ballot) = self.bump.take().unwrap();
            trace!(slot, counter = ballot.counter, "bump timer fired");
            self.events.on_bump_ballot(slot, &ballot);
        }

        let mut due = Vec::new();
        for (key, entries) in self.ballot_timers.iter_mut() {
            let mut i = 0;
            while i < entries.len() {
                if entries[i].expires_at <= now {
                    trace!(counter = key.0.counter, requester = %key.1, "ballot timer fired");
                    due.push(entries.remove(i).cb);
                } else {
                    i += 1;
                }
            }
        }
        self.ballot_timers.retain(|_, entries| !entries.is_empty());
        for cb in due {
            cb(true);
        }
    }

    fn rush_ballot(&mut self, ballot: &FbaBallot) {
        let keys: Vec<(FbaBallot, NodeId)> = self
            .ballot_timers
            .keys()
            .filter(|(b, _)| b == ballot)
            .cloned()
            .collect();
        if keys.is_empty() {
            return;
        }
        debug!(counter = ballot.counter, rushed = keys.len(), "rushing ballot validation");
        for key in keys {
            if let Some(entries) = self.ballot_timers.remove(&key) {
                for entry in entries {
                    (entry.cb)(true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct TestEvents {
        triggers: AtomicUsize,
        bumps: AtomicU64,
    }

    impl TimerEvents for TestEvents {
        fn on_trigger_ledger(&self) {
            self.triggers.fetch_add(1, Ordering::SeqCst);
        }

        fn on_bump_ballot(&self, slot: SlotIndex, _ballot: &FbaBallot) {
            self.bumps.store(slot, Ordering::SeqCst);
        }
    }

    fn ballot(counter: u32) -> FbaBallot {
        FbaBallot {
            counter,
            value: vec![counter as u8],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_fires_once() {
        let events = Arc::new(TestEvents::default());
        let (handle, manager) = TimerManager::new(events.clone());
        let task = tokio::spawn(manager.run());

        handle.schedule_trigger(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(events.triggers.load(Ordering::SeqCst), 1);
        handle.shutdown();
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_trigger_prevents_firing() {
        let events = Arc::new(TestEvents::default());
        let (handle, manager) = TimerManager::new(events.clone());
        let task = tokio::spawn(manager.run());

        handle.schedule_trigger(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel_trigger();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(events.triggers.load(Ordering::SeqCst), 0);
        handle.shutdown();
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_bump_replaces_prior() {
        let events = Arc::new(TestEvents::default());
        let (handle, manager) = TimerManager::new(events.clone());
        let task = tokio::spawn(manager.run());

        handle.schedule_bump(5, ballot(0), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.schedule_bump(6, ballot(1), Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(1)).await;

        // First arming was replaced before it fired
        assert_eq!(events.bumps.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(events.bumps.load(Ordering::SeqCst), 6);

        handle.shutdown();
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ballot_timer_fires_with_accept() {
        let events = Arc::new(TestEvents::default());
        let (handle, manager) = TimerManager::new(events);
        let task = tokio::spawn(manager.run());

        let verdict = Arc::new(AtomicUsize::new(0));
        let v = Arc::clone(&verdict);
        handle.schedule_ballot_timer(
            ballot(0),
            NodeId([1u8; 32]),
            Duration::from_millis(500),
            Box::new(move |ok| {
                v.store(if ok { 1 } else { 2 }, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(verdict.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(verdict.load(Ordering::SeqCst), 1);

        handle.shutdown();
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rush_fires_all_for_ballot_early() {
        let events = Arc::new(TestEvents::default());
        let (handle, manager) = TimerManager::new(events);
        let task = tokio::spawn(manager.run());

        let fired = Arc::new(AtomicUsize::new(0));
        for node in 1..=3u8 {
            let fired = Arc::clone(&fired);
            handle.schedule_ballot_timer(
                ballot(4),
                NodeId([node; 32]),
                Duration::from_secs(8),
                Box::new(move |ok| {
                    assert!(ok);
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        // A different ballot is untouched by the rush
        let other = Arc::new(AtomicUsize::new(0));
        let o = Arc::clone(&other);
        handle.schedule_ballot_timer(
            ballot(5),
            NodeId([9u8; 32]),
            Duration::from_secs(60),
            Box::new(move |_| {
                o.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.rush_ballot(ballot(4));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(other.load(Ordering::SeqCst), 0);

        handle.shutdown();
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_ballot_timers_silently() {
        let events = Arc::new(TestEvents::default());
        let (handle, manager) = TimerManager::new(events);
        let task = tokio::spawn(manager.run());

        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        handle.schedule_ballot_timer(
            ballot(2),
            NodeId([1u8; 32]),
            Duration::from_secs(2),
            Box::new(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.clear_ballot_timers();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);

        handle.shutdown();
        let _ = task.await;
    }
}
