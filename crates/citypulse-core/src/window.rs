use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Measurement, MeasurementSet};

/// Which measurements survive into the frozen set.
///
/// Applied once, after accumulation and before statistics or alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateWindow {
    #[default]
    All,
    /// The `days` before the newest measurement, newest included.
    TrailingFromLatest { days: u32 },
    /// The `days` before `now`, `now` included.
    TrailingFromNow { days: u32, now: DateTime<Utc> },
    /// Inclusive on both ends.
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl DateWindow {
    /// Resolve the window to concrete bounds for `set`.
    ///
    /// `None` means unbounded (or nothing to bound against).
    pub fn bounds(&self, set: &MeasurementSet) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match *self {
            DateWindow::All => None,
            DateWindow::TrailingFromLatest { days } => {
                let end = set.latest()?.timestamp;
                Some((days_before(end, days), end))
            }
            DateWindow::TrailingFromNow { days, now } => Some((days_before(now, days), now)),
            DateWindow::Between { start, end } => Some((start, end)),
        }
    }

    /// Keep only the measurements inside the window. Order is preserved.
    pub fn apply(&self, set: MeasurementSet) -> MeasurementSet {
        let Some((start, end)) = self.bounds(&set) else {
            return set;
        };
        let kept: Vec<Measurement> = set
            .iter()
            .filter(|m| m.timestamp >= start && m.timestamp <= end)
            .cloned()
            .collect();
        // Already sorted; the stable sort is a no-op.
        MeasurementSet::from_unsorted(kept)
    }

    pub fn describe(&self) -> String {
        match self {
            DateWindow::All => "all data".to_string(),
            DateWindow::TrailingFromLatest { days } => {
                format!("last {} days before the newest reading", days)
            }
            DateWindow::TrailingFromNow { days, .. } => format!("last {} days", days),
            DateWindow::Between { start, end } => format!(
                "{} to {}",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            ),
        }
    }
}

/// `anchor` minus `days`, clamped to the earliest representable instant.
fn days_before(anchor: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|span| anchor.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> Measurement {
        Measurement::zeroed(Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap())
    }

    fn set() -> MeasurementSet {
        MeasurementSet::from_unsorted((1..=20).map(day).collect())
    }

    #[test]
    fn test_all_keeps_everything() {
        assert_eq!(DateWindow::All.apply(set()).len(), 20);
    }

    #[test]
    fn test_trailing_from_latest() {
        let out = DateWindow::TrailingFromLatest { days: 7 }.apply(set());
        // 13th..=20th: the lower bound is inclusive.
        assert_eq!(out.len(), 8);
        assert_eq!(out.earliest().unwrap().timestamp, day(13).timestamp);
        assert_eq!(out.latest().unwrap().timestamp, day(20).timestamp);
    }

    #[test]
    fn test_huge_trailing_window_keeps_everything_up_to_anchor() {
        let out = DateWindow::TrailingFromLatest { days: 100_000_000 }.apply(set());
        assert_eq!(out.len(), 20);

        let now = day(10).timestamp;
        let out = DateWindow::TrailingFromNow { days: u32::MAX, now }.apply(set());
        assert_eq!(out.len(), 10);
        assert_eq!(
            DateWindow::TrailingFromNow { days: u32::MAX, now }
                .bounds(&set())
                .unwrap()
                .0,
            DateTime::<Utc>::MIN_UTC
        );
    }

    #[test]
    fn test_trailing_from_now_can_be_empty() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let out = DateWindow::TrailingFromNow { days: 7, now }.apply(set());
        assert!(out.is_empty());
    }

    #[test]
    fn test_between_is_inclusive() {
        let w = DateWindow::Between {
            start: day(5).timestamp,
            end: day(7).timestamp,
        };
        assert_eq!(w.apply(set()).len(), 3);
    }

    #[test]
    fn test_trailing_from_latest_on_empty_set() {
        let out = DateWindow::TrailingFromLatest { days: 7 }.apply(MeasurementSet::empty());
        assert!(out.is_empty());
    }
}
