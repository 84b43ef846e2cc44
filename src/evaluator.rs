//! State evaluation - the pluggable policy and the debounce step

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::journal::JournalRecord;

/// Derives the aggregate state from journal history.
///
/// Implementations must be deterministic: the same `(current, changed_at, journal)`
/// always yields the same state, so a recorded journal can be replayed.
pub trait StateEvaluator<S>: Send + Sync {
    fn evaluate(&self, current: &S, changed_at: DateTime<Utc>, journal: &[JournalRecord]) -> S;
}

impl<S, F> StateEvaluator<S> for F
where
    F: Fn(&S, DateTime<Utc>, &[JournalRecord]) -> S + Send + Sync,
{
    fn evaluate(&self, current: &S, changed_at: DateTime<Utc>, journal: &[JournalRecord]) -> S {
        self(current, changed_at, journal)
    }
}

/// A state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange<S> {
    pub state: S,
    pub previous: S,
    pub changed_at: DateTime<Utc>,
}

/// Holds the current state and applies evaluator output with debounce
#[derive(Debug, Clone)]
pub struct StateTracker<S> {
    current: S,
    changed_at: DateTime<Utc>,
}

impl<S: Clone + PartialEq> StateTracker<S> {
    pub fn new(seed: S, changed_at: DateTime<Utc>) -> Self {
        Self {
            current: seed,
            changed_at,
        }
    }

    pub fn current(&self) -> &S {
        &self.current
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    /// Returns the transition if `next` differs from the current state.
    /// An equal state leaves both the state and `changed_at` untouched.
    pub fn apply(&mut self, next: S, at: DateTime<Utc>) -> Option<StateChange<S>> {
        if next == self.current {
            return None;
        }
        let previous = std::mem::replace(&mut self.current, next);
        self.changed_at = at;
        Some(StateChange {
            state: self.current.clone(),
            previous,
            changed_at: at,
        })
    }

    /// Runs `evaluator` against `journal` and applies the result
    pub fn step<E>(&mut self, evaluator: &E, journal: &[JournalRecord], at: DateTime<Utc>) -> Option<StateChange<S>>
    where
        E: StateEvaluator<S> + ?Sized,
    {
        let next = evaluator.evaluate(&self.current, self.changed_at, journal);
        self.apply(next, at)
    }
}
