//! Tests for journal retention

use chrono::{DateTime, Duration, Utc};
use spectator::{FailureKind, Journal, JournalRecord, ProbeFailure, ProbeResult};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn record(secs: i64, ok: bool) -> JournalRecord {
    let value = if ok {
        ProbeResult::ok("disk", "free=40%")
    } else {
        ProbeResult::failed("disk", ProbeFailure::new(FailureKind::Error, "free=2%"))
    };
    JournalRecord::new(at(secs), vec![value.with_timestamp(at(secs))])
}

#[test]
fn test_retention_holds_after_every_append() {
    // Given: irregularly spaced cycles
    let offsets = [0, 1, 2, 7, 8, 30, 31, 45, 90, 91, 92, 200];

    for retention in [0, 1, 5, 15, 60] {
        let mut journal = Journal::new(Duration::seconds(retention));
        let mut appended = Vec::new();

        for (i, &s) in offsets.iter().enumerate() {
            // When: appending each record in order
            journal.append(record(s, i % 3 != 0));
            appended.push(s);

            // Then: exactly the suffix within `retention` of this append survives
            let expected: Vec<_> = appended
                .iter()
                .filter(|&&t| s - t <= retention)
                .map(|&t| at(t))
                .collect();
            let retained: Vec<_> = journal.iter().map(|r| r.timestamp()).collect();
            assert_eq!(retained, expected, "retention={} after append at {}", retention, s);
        }
    }
}

#[test]
fn test_latest_record_always_survives_its_append() {
    let mut journal = Journal::new(Duration::zero());
    for s in [0, 10, 20] {
        journal.append(record(s, true));
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.latest().map(|r| r.timestamp()), Some(at(s)));
    }
}

#[test]
fn test_eviction_is_monotonic() {
    // Given: a record evicted by a later append
    let mut journal = Journal::new(Duration::seconds(10));
    journal.append(record(0, false));
    journal.append(record(20, true));
    assert_eq!(journal.len(), 1);

    // When: a late record for the evicted period arrives
    journal.append(record(0, false));

    // Then: it is not re-admitted
    let retained: Vec<_> = journal.iter().map(|r| r.timestamp()).collect();
    assert_eq!(retained, vec![at(20)]);
}
