//! Spectator - runs probes, journals results and raises state change notifications
//!
//! One call to [`Spectator::run_cycle`] is one poll cycle:
//!
//! 1. every registered probe is checked concurrently and joined
//! 2. the results become one [`JournalRecord`] appended to the [`Journal`]
//! 3. "checked" listeners receive the record
//! 4. the evaluator derives the next state from the journal
//! 5. "state changed" listeners fire only if that state differs from the current one
//!
//! `run_cycle` takes `&mut self`, so cycles and probe registration are serialized by
//! whoever owns the spectator. Scheduling cycles is left to the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, SpectatorError};
use crate::evaluator::{StateChange, StateEvaluator, StateTracker};
use crate::journal::{Journal, JournalRecord};
use crate::probe::{FailureKind, Probe, ProbeFailure, ProbeResult};

/// Time source for cycle timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Handle returned by listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type CheckedHandler = Box<dyn Fn(&JournalRecord) + Send + Sync>;
type StateChangedHandler<S> = Box<dyn Fn(&StateChange<S>) + Send + Sync>;

/// Summary of one poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport<S> {
    pub timestamp: DateTime<Utc>,
    pub probes: usize,
    pub failures: usize,
    pub change: Option<StateChange<S>>,
}

pub struct Spectator<S> {
    evaluator: Box<dyn StateEvaluator<S>>,
    probes: Vec<Arc<dyn Probe>>,
    journal: Journal,
    tracker: StateTracker<S>,
    clock: Arc<dyn Clock>,
    probe_timeout: Option<Duration>,
    checked: Vec<(SubscriptionId, CheckedHandler)>,
    state_changed: Vec<(SubscriptionId, StateChangedHandler<S>)>,
    next_subscription: u64,
    state_tx: watch::Sender<S>,
    cycles: u64,
}

impl<S> Spectator<S>
where
    S: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static,
{
    /// Creates a spectator seeded with `initial`; the last-change time is now
    pub fn new<E>(evaluator: E, retention: chrono::Duration, initial: S) -> Self
    where
        E: StateEvaluator<S> + 'static,
    {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let (state_tx, _) = watch::channel(initial.clone());
        Self {
            evaluator: Box::new(evaluator),
            probes: Vec::new(),
            journal: Journal::new(retention),
            tracker: StateTracker::new(initial, clock.now()),
            clock,
            probe_timeout: None,
            checked: Vec::new(),
            state_changed: Vec::new(),
            next_subscription: 0,
            state_tx,
            cycles: 0,
        }
    }

    /// Replaces the time source. The construction time is re-read from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tracker = StateTracker::new(self.tracker.current().clone(), clock.now());
        self.clock = clock;
        self
    }

    /// Bounds every probe check; a probe that overruns yields a `Timeout` failure.
    /// Requires a tokio runtime with the time driver enabled.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Registers a probe for the next cycle onward
    pub fn add_probe(&mut self, probe: Arc<dyn Probe>) -> Result<()> {
        if self.probes.iter().any(|p| p.name() == probe.name()) {
            return Err(SpectatorError::DuplicateProbe(probe.name().to_string()));
        }
        info!(probe = probe.name(), "Registering probe");
        self.probes.push(probe);
        Ok(())
    }

    /// Removes a probe by name; returns false if none matched
    pub fn remove_probe(&mut self, name: &str) -> bool {
        let before = self.probes.len();
        self.probes.retain(|p| p.name() != name);
        let removed = self.probes.len() != before;
        if removed {
            info!(probe = name, "Removed probe");
        }
        removed
    }

    pub fn probe_names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// Subscribes to the raw record of every cycle
    pub fn on_checked<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: Fn(&JournalRecord) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.checked.push((id, Box::new(handler)));
        id
    }

    /// Subscribes to state transitions
    pub fn on_state_changed<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChange<S>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.state_changed.push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.checked.len() + self.state_changed.len();
        self.checked.retain(|(sid, _)| *sid != id);
        self.state_changed.retain(|(sid, _)| *sid != id);
        before != self.checked.len() + self.state_changed.len()
    }

    pub fn clear_listeners(&mut self) {
        self.checked.clear();
        self.state_changed.clear();
    }

    /// Receiver that always holds the current state, for health endpoints and other
    /// readers outside the owning task
    pub fn subscribe_state(&self) -> watch::Receiver<S> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> &S {
        self.tracker.current()
    }

    pub fn state_changed_at(&self) -> DateTime<Utc> {
        self.tracker.changed_at()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs one poll cycle.
    ///
    /// The cycle time is read once before any probe runs and becomes the record's
    /// [`JournalRecord::timestamp`] and the `changed_at` of any transition. Each
    /// [`ProbeResult::timestamp`] keeps the probe's own completion time; evaluators
    /// that reason about cycles should use the record timestamp.
    ///
    /// # Panics
    ///
    /// A panicking evaluator propagates out of this call. The journal already holds
    /// the new record at that point, but the state and listeners are untouched.
    pub async fn run_cycle(&mut self) -> CycleReport<S> {
        let timestamp = self.clock.now();
        let values = self.check_all().await;

        let record = JournalRecord::new(timestamp, values);
        let failures = record.failed().count();
        let probes = record.values().len();
        self.journal.append(record.clone());
        self.cycles += 1;

        debug!(
            cycle = self.cycles,
            probes,
            failures,
            retained = self.journal.len(),
            "Cycle checked"
        );

        for (_, handler) in &self.checked {
            handler(&record);
        }

        let change = self
            .tracker
            .step(self.evaluator.as_ref(), self.journal.records(), timestamp);

        if let Some(change) = &change {
            info!(
                previous = ?change.previous,
                state = ?change.state,
                "Health state changed"
            );
            self.state_tx.send_replace(change.state.clone());
            for (_, handler) in &self.state_changed {
                handler(change);
            }
        }

        CycleReport {
            timestamp,
            probes,
            failures,
            change,
        }
    }

    async fn check_all(&self) -> Vec<ProbeResult> {
        let limit = self.probe_timeout;
        let checks = self.probes.iter().map(|probe| {
            let probe = Arc::clone(probe);
            async move {
                // a probe that breaks its own contract still yields one result,
                // whether it panics building its future or while it runs
                let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| probe.check())) {
                    Ok(fut) => {
                        let check = AssertUnwindSafe(fut).catch_unwind();
                        match limit {
                            Some(limit) => match tokio::time::timeout(limit, check).await {
                                Ok(outcome) => outcome,
                                Err(_) => {
                                    warn!(probe = probe.name(), timeout = ?limit, "Probe timed out");
                                    return ProbeResult::failed(
                                        probe.name(),
                                        ProbeFailure::new(
                                            FailureKind::Timeout,
                                            format!("no result within {}ms", limit.as_millis()),
                                        ),
                                    );
                                }
                            },
                            None => check.await,
                        }
                    }
                    Err(payload) => Err(payload),
                };

                match outcome {
                    Ok(result) => {
                        if !result.is_success() {
                            debug!(probe = probe.name(), failure = ?result.failure(), "Probe failed");
                        }
                        result
                    }
                    Err(payload) => {
                        let failure = ProbeFailure::from_panic(payload.as_ref());
                        warn!(probe = probe.name(), message = %failure.message, "Probe panicked outside its own guard");
                        ProbeResult::failed(probe.name(), failure)
                    }
                }
            }
        });

        join_all(checks).await
    }

    fn next_id(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId(self.next_subscription)
    }
}
