//! Integration tests for the Spectator cycle

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use spectator::{
    probe_fn, replay, Clock, FailureKind, HealthState, JournalRecord, Probe, ProbeResult, Spectator,
    TrailingWindowEvaluator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unknown,
    Live,
    Warning,
    Down,
}

/// Down if >=2 of the last 3 records contain a failure, Warning if 1, else Live
fn window_evaluator(_: &State, _: DateTime<Utc>, journal: &[JournalRecord]) -> State {
    let start = journal.len().saturating_sub(3);
    let failed = journal[start..].iter().filter(|r| r.has_failure()).count();
    match failed {
        0 => State::Live,
        1 => State::Warning,
        _ => State::Down,
    }
}

/// A probe that replays a fixed sequence of outcomes, then succeeds forever
fn scripted(name: &'static str, outcomes: &[bool]) -> Arc<dyn Probe> {
    let queue = Arc::new(Mutex::new(outcomes.iter().copied().collect::<VecDeque<_>>()));
    probe_fn(name, move || {
        let next = queue.lock().unwrap().pop_front();
        async move {
            match next {
                Some(false) => Err(anyhow!("scripted failure")),
                _ => Ok(ProbeResult::ok(name, "")),
            }
        }
    })
}

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new(secs: i64) -> Arc<Self> {
        Arc::new(Self(Mutex::new(at(secs))))
    }

    fn set(&self, secs: i64) {
        *self.0.lock().unwrap() = at(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn record_states<S>(spectator: &mut Spectator<S>) -> Arc<Mutex<Vec<S>>>
where
    S: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static,
{
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    spectator.on_state_changed(move |change| sink.lock().unwrap().push(change.state.clone()));
    states
}

#[tokio::test]
async fn test_two_probe_scenario_emits_five_transitions() {
    // Given: two probes, probe1 fails on the 4th cycle, probe2 on the 3rd and 5th
    let mut spectator = Spectator::new(window_evaluator, chrono::Duration::minutes(10), State::Unknown);
    spectator
        .add_probe(scripted("Test-1", &[true, true, true, false, true, true, true, true]))
        .unwrap();
    spectator
        .add_probe(scripted("Test-2", &[true, true, false, true, false, true, true, true]))
        .unwrap();
    let states = record_states(&mut spectator);

    // When: running 8 cycles
    for _ in 0..8 {
        spectator.run_cycle().await;
    }

    // Then: repeats are suppressed
    assert_eq!(
        *states.lock().unwrap(),
        vec![State::Live, State::Warning, State::Down, State::Warning, State::Live]
    );
    assert_eq!(*spectator.state(), State::Live);
    assert_eq!(spectator.journal().len(), 8);
}

#[tokio::test]
async fn test_debounce_keeps_state_changed_at() {
    // Given: a manual clock and a probe that always succeeds
    let clock = ManualClock::new(0);
    let mut spectator = Spectator::new(window_evaluator, chrono::Duration::minutes(10), State::Unknown)
        .with_clock(clock.clone());
    spectator.add_probe(scripted("ok", &[])).unwrap();
    let states = record_states(&mut spectator);
    assert_eq!(spectator.state_changed_at(), at(0));

    // When: the first cycle changes the state, later cycles do not
    clock.set(10);
    let first = spectator.run_cycle().await;
    clock.set(20);
    let second = spectator.run_cycle().await;
    clock.set(30);
    spectator.run_cycle().await;

    // Then: only one transition, stamped with the first cycle's time
    assert_eq!(first.change.map(|c| c.changed_at), Some(at(10)));
    assert!(second.change.is_none());
    assert_eq!(states.lock().unwrap().len(), 1);
    assert_eq!(spectator.state_changed_at(), at(10));
}

#[tokio::test]
async fn test_checked_precedes_state_changed() {
    // Given: listeners on both channels writing to one log
    let mut spectator = Spectator::new(window_evaluator, chrono::Duration::minutes(10), State::Unknown);
    spectator.add_probe(scripted("p", &[true, false])).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let checked_log = Arc::clone(&log);
    spectator.on_checked(move |record| {
        checked_log
            .lock()
            .unwrap()
            .push(format!("checked:{}", record.values().len()))
    });
    let changed_log = Arc::clone(&log);
    spectator.on_state_changed(move |change| {
        changed_log
            .lock()
            .unwrap()
            .push(format!("changed:{:?}->{:?}", change.previous, change.state))
    });

    // When: two cycles, both changing state
    spectator.run_cycle().await;
    spectator.run_cycle().await;

    // Then: each cycle's checked event comes first
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "checked:1".to_string(),
            "changed:Unknown->Live".to_string(),
            "checked:1".to_string(),
            "changed:Live->Warning".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_failing_probe_does_not_hide_others() {
    // Given: one probe erroring, one succeeding
    let mut spectator = Spectator::new(window_evaluator, chrono::Duration::minutes(10), State::Unknown);
    spectator.add_probe(scripted("broken", &[false])).unwrap();
    spectator.add_probe(scripted("healthy", &[])).unwrap();

    // When
    let report = spectator.run_cycle().await;

    // Then: both results present in registration order, one failed
    let record = spectator.journal().latest().unwrap();
    let names: Vec<_> = record.values().iter().map(|v| v.probe_name()).collect();
    assert_eq!(names, vec!["broken", "healthy"]);
    assert_eq!(report.failures, 1);

    let broken = &record.values()[0];
    assert!(!broken.is_success());
    assert_eq!(broken.payload(), "");
    let failure = broken.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Error);
    assert!(failure.message.contains("scripted failure"));
}

#[tokio::test]
async fn test_probe_timeout_yields_failed_result() {
    // Given: a probe that never answers in time
    let mut spectator = Spectator::new(window_evaluator, chrono::Duration::minutes(10), State::Unknown)
        .with_probe_timeout(Duration::from_millis(20));
    spectator
        .add_probe(probe_fn("slow", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ProbeResult::ok("slow", ""))
        }))
        .unwrap();
    spectator.add_probe(scripted("fast", &[])).unwrap();

    // When
    let report = spectator.run_cycle().await;

    // Then
    let record = spectator.journal().latest().unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(
        record.get("slow").and_then(|r| r.failure()).map(|f| f.kind),
        Some(FailureKind::Timeout)
    );
    assert!(record.get("fast").unwrap().is_success());
}

#[tokio::test]
async fn test_probe_registration_applies_to_next_cycle() {
    let mut spectator = Spectator::new(window_evaluator, chrono::Duration::minutes(10), State::Unknown);
    spectator.add_probe(scripted("a", &[])).unwrap();
    spectator.add_probe(scripted("b", &[])).unwrap();
    assert_eq!(spectator.run_cycle().await.probes, 2);

    assert!(spectator.remove_probe("a"));
    assert!(!spectator.remove_probe("a"));
    assert_eq!(spectator.run_cycle().await.probes, 1);

    // a removed name can be registered again
    spectator.add_probe(scripted("a", &[])).unwrap();
    assert_eq!(spectator.probe_names(), vec!["b", "a"]);
}

#[tokio::test]
async fn test_state_receiver_tracks_transitions() {
    let mut spectator = Spectator::new(
        TrailingWindowEvaluator::default(),
        chrono::Duration::minutes(10),
        HealthState::Unknown,
    );
    spectator.add_probe(scripted("p", &[false])).unwrap();
    let rx = spectator.subscribe_state();
    assert_eq!(*rx.borrow(), HealthState::Unknown);

    spectator.run_cycle().await;
    assert_eq!(*rx.borrow(), HealthState::Degraded);
}

#[tokio::test]
async fn test_evaluator_panic_propagates_without_state_change() {
    // Given: an evaluator with a bug
    let evaluator = |_: &State, _: DateTime<Utc>, _: &[JournalRecord]| -> State { panic!("policy bug") };
    let mut spectator = Spectator::new(evaluator, chrono::Duration::minutes(10), State::Unknown);
    spectator.add_probe(scripted("p", &[])).unwrap();
    let states = record_states(&mut spectator);

    // When
    let outcome = AssertUnwindSafe(spectator.run_cycle()).catch_unwind().await;

    // Then: the caller sees the panic, the state is untouched
    assert!(outcome.is_err());
    assert_eq!(*spectator.state(), State::Unknown);
    assert!(states.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_replaying_checked_records_reproduces_states() {
    // Given: a live run with its checked records captured
    let mut spectator = Spectator::new(window_evaluator, chrono::Duration::minutes(10), State::Unknown);
    let seeded_at = spectator.state_changed_at();
    spectator
        .add_probe(scripted("x", &[true, false, false, true, true, true, false, true, true, true]))
        .unwrap();
    let states = record_states(&mut spectator);

    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    spectator.on_checked(move |record| sink.lock().unwrap().push(record.clone()));

    for _ in 0..10 {
        spectator.run_cycle().await;
    }

    // When: replaying the captured records twice
    let captured = records.lock().unwrap().clone();
    let first: Vec<State> = replay(captured.clone(), &window_evaluator, State::Unknown, Some(seeded_at), chrono::Duration::minutes(10))
        .into_iter()
        .map(|c| c.state)
        .collect();
    let second: Vec<State> = replay(captured, &window_evaluator, State::Unknown, Some(seeded_at), chrono::Duration::minutes(10))
        .into_iter()
        .map(|c| c.state)
        .collect();

    // Then: same sequence as the live run
    assert_eq!(first, *states.lock().unwrap());
    assert_eq!(first, second);
}

/// Live once the initial state has been held for 10 seconds
fn hold_evaluator(current: &State, changed_at: DateTime<Utc>, journal: &[JournalRecord]) -> State {
    match journal.last() {
        Some(last) if *current == State::Unknown && last.timestamp() - changed_at >= chrono::Duration::seconds(10) => {
            State::Live
        }
        _ => *current,
    }
}

#[tokio::test]
async fn test_replay_with_live_seed_time_matches_time_aware_evaluator() {
    // Given: a clock at t=0 when the spectator is built
    let clock = ManualClock::new(0);
    let mut spectator = Spectator::new(hold_evaluator, chrono::Duration::minutes(10), State::Unknown)
        .with_clock(clock.clone());
    let seeded_at = spectator.state_changed_at();
    spectator.add_probe(scripted("ok", &[])).unwrap();
    let states = record_states(&mut spectator);

    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    spectator.on_checked(move |record| sink.lock().unwrap().push(record.clone()));

    // When: cycles at t=5 and t=10
    clock.set(5);
    spectator.run_cycle().await;
    clock.set(10);
    spectator.run_cycle().await;
    assert_eq!(*states.lock().unwrap(), vec![State::Live]);

    // Then: replay seeded with the live start time gives the same transitions
    let captured = records.lock().unwrap().clone();
    let replayed: Vec<State> = replay(captured.clone(), &hold_evaluator, State::Unknown, Some(seeded_at), chrono::Duration::minutes(10))
        .into_iter()
        .map(|c| c.state)
        .collect();
    assert_eq!(replayed, *states.lock().unwrap());

    // Seeding from the first record (t=5) has only held 5 seconds by t=10
    assert!(replay(captured, &hold_evaluator, State::Unknown, None, chrono::Duration::minutes(10)).is_empty());
}
