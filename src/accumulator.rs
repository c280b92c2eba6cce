//! Turns a segment's cumulative counters into a daily delta against the log.

use crate::errors::StoreError;
use crate::models::{LogRecord, SegmentSnapshot};
use crate::storage::{HistoryStatus, LogStore};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

/// The last recorded observation a delta was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub date: NaiveDate,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulation {
    pub record: LogRecord,
    pub baseline: Option<Baseline>,
    /// The counter went backwards and the delta was forced to zero.
    pub clamped: bool,
}

/// Computes today's record for `snapshot` from the segment's prior records,
/// which must already be in date order (as [`LogStore::query`] returns them).
pub fn daily_record(
    snapshot: &SegmentSnapshot,
    history: &[LogRecord],
    today: NaiveDate,
) -> Accumulation {
    let baseline = history.last().map(|last| Baseline {
        date: last.date,
        total: last.cumulative_attempts_on_date,
    });

    let (daily_attempts, clamped) = match baseline {
        // first observation: no spike for the whole lifetime count
        None => (0, false),
        Some(base) => match snapshot.cumulative_attempts.checked_sub(base.total) {
            Some(delta) => (delta, false),
            None => (0, true),
        },
    };

    Accumulation {
        record: LogRecord {
            segment_id: snapshot.id,
            segment_name: snapshot.name.clone(),
            date: today,
            cumulative_attempts_on_date: snapshot.cumulative_attempts,
            daily_attempts,
            athlete_count: snapshot.cumulative_athletes,
        },
        baseline,
        clamped,
    }
}

/// Computes today's record for `snapshot` and appends it to `store`.
pub fn accumulate<S: LogStore>(
    snapshot: &SegmentSnapshot,
    store: &mut S,
    today: NaiveDate,
) -> Result<Accumulation, StoreError> {
    if let HistoryStatus::Corrupt(reason) = store.status() {
        debug!(
            "segment {}: log history unreadable ({reason}), treating as first observation",
            snapshot.id
        );
    }

    let history = store.query(snapshot.id);
    let accumulation = daily_record(snapshot, &history, today);

    match accumulation.baseline {
        None => debug!(
            "segment {}: first observation, daily attempts set to 0",
            snapshot.id
        ),
        Some(base) if accumulation.clamped => warn!(
            "segment {}: cumulative attempts went backwards ({} now, {} on {}); daily attempts reset to 0",
            snapshot.id, snapshot.cumulative_attempts, base.total, base.date
        ),
        Some(_) => {}
    }

    store.append(accumulation.record.clone())?;

    let last = accumulation
        .baseline
        .map(|base| format!("{} on {}", base.total, base.date))
        .unwrap_or_else(|| "N/A".to_string());
    info!(
        "segment {} ('{}'): total {}, last recorded {}, today {}, athletes {}",
        snapshot.id,
        snapshot.name,
        snapshot.cumulative_attempts,
        last,
        accumulation.record.daily_attempts,
        snapshot.cumulative_athletes
    );

    Ok(accumulation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLogStore;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn snapshot(id: u64, attempts: u64) -> SegmentSnapshot {
        SegmentSnapshot {
            id,
            name: format!("Segment {id}"),
            cumulative_attempts: attempts,
            cumulative_athletes: 40,
        }
    }

    fn prior(id: u64, date: &str, total: u64) -> LogRecord {
        LogRecord {
            segment_id: id,
            segment_name: format!("Segment {id}"),
            date: day(date),
            cumulative_attempts_on_date: total,
            daily_attempts: 0,
            athlete_count: 40,
        }
    }

    #[test]
    fn first_observation_has_zero_daily_attempts() {
        let mut store = MemoryLogStore::default();
        let result = accumulate(&snapshot(9, 5000), &mut store, day("2024-02-01")).unwrap();

        assert_eq!(result.record.daily_attempts, 0);
        assert_eq!(result.record.cumulative_attempts_on_date, 5000);
        assert_eq!(result.baseline, None);
        assert!(!result.clamped);
    }

    #[test]
    fn other_segments_do_not_count_as_history() {
        let mut store = MemoryLogStore::new(vec![prior(1, "2024-01-01", 100)]);
        let result = accumulate(&snapshot(2, 300), &mut store, day("2024-01-02")).unwrap();
        assert_eq!(result.record.daily_attempts, 0);
    }

    #[test]
    fn delta_against_previous_total() {
        let mut store = MemoryLogStore::new(vec![prior(1, "2024-01-01", 100)]);
        let result = accumulate(&snapshot(1, 137), &mut store, day("2024-01-02")).unwrap();

        assert_eq!(result.record.daily_attempts, 37);
        assert_eq!(
            result.baseline,
            Some(Baseline {
                date: day("2024-01-01"),
                total: 100
            })
        );
    }

    #[test]
    fn decreasing_counter_is_clamped_to_zero() {
        let mut store = MemoryLogStore::new(vec![prior(1, "2024-01-01", 200)]);
        let result = accumulate(&snapshot(1, 150), &mut store, day("2024-01-02")).unwrap();

        assert_eq!(result.record.daily_attempts, 0);
        assert!(result.clamped);
        assert_eq!(store.records().last().unwrap().daily_attempts, 0);
    }

    #[test]
    fn baseline_is_latest_date_not_latest_append() {
        let mut store = MemoryLogStore::new(vec![
            prior(1, "2024-01-03", 25),
            prior(1, "2024-01-01", 10),
        ]);
        let result = accumulate(&snapshot(1, 40), &mut store, day("2024-01-04")).unwrap();

        assert_eq!(result.baseline.unwrap().total, 25);
        assert_eq!(result.record.daily_attempts, 15);
    }

    #[test]
    fn same_day_rerun_uses_the_earlier_run_as_baseline() {
        let mut store = MemoryLogStore::new(vec![prior(1, "2024-01-01", 10)]);
        let today = day("2024-01-02");

        let first = accumulate(&snapshot(1, 20), &mut store, today).unwrap();
        let second = accumulate(&snapshot(1, 23), &mut store, today).unwrap();

        assert_eq!(first.record.daily_attempts, 10);
        assert_eq!(second.baseline.unwrap().total, 20);
        assert_eq!(second.record.daily_attempts, 3);
        assert_eq!(store.query(1).iter().filter(|r| r.date == today).count(), 2);
    }

    #[test]
    fn same_date_duplicates_break_ties_by_append_order() {
        let history = vec![prior(1, "2024-01-05", 50), prior(1, "2024-01-05", 60)];
        let result = daily_record(&snapshot(1, 65), &history, day("2024-01-06"));
        assert_eq!(result.record.daily_attempts, 5);
    }

    #[test]
    fn log_only_grows() {
        let seed = vec![prior(1, "2024-01-01", 10), prior(2, "2024-01-01", 20)];
        let mut store = MemoryLogStore::new(seed.clone());

        for (n, attempts) in [12_u64, 8, 30].into_iter().enumerate() {
            accumulate(&snapshot(1, attempts), &mut store, day("2024-01-02")).unwrap();
            assert_eq!(store.len(), seed.len() + n + 1);
            assert_eq!(&store.records()[..seed.len()], seed.as_slice());
        }
    }
}
