//! Rolling statistics over persisted attendance records.

use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::types::AttendanceRecord;

/// Number of most recent sessions included in the trend series.
pub const TREND_WINDOW: usize = 7;

/// One bar of the attendance trend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    /// Short date label in the labelling timezone, e.g. "Oct 18".
    pub label: String,
    pub present: usize,
    pub absent: usize,
}

/// Aggregate view over the whole attendance history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub session_count: usize,
    /// Whole-number percentage in [0, 100] for well-formed histories.
    pub average_attendance_pct: u32,
    /// Up to [`TREND_WINDOW`] sessions, most recent first.
    pub trend: Vec<TrendPoint>,
    pub last_session_absentees: usize,
}

/// Order records newest first. Ties on `captured_at` fall back to id so the
/// order is total and stable across reads.
pub fn sort_most_recent_first(records: &mut [AttendanceRecord]) {
    records.sort_by(|a, b| {
        b.captured_at
            .cmp(&a.captured_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Summarize `records`, which must already be ordered most recent first.
///
/// The average is taken against the *current* roster size, while trend and
/// absentee counts use each record's roster size at capture. Trend labels
/// use the host's local date.
pub fn summarize(records: &[AttendanceRecord], current_roster_size: usize) -> HistorySummary {
    summarize_in(records, current_roster_size, &Local)
}

/// [`summarize`] with trend labels rendered as dates in `tz`.
pub fn summarize_in<Tz: TimeZone>(
    records: &[AttendanceRecord],
    current_roster_size: usize,
    tz: &Tz,
) -> HistorySummary {
    let session_count = records.len();
    let total_present: usize = records.iter().map(AttendanceRecord::present_count).sum();

    let average_attendance_pct = if session_count == 0 {
        0
    } else {
        let denom = (session_count * current_roster_size.max(1)) as f64;
        (100.0 * total_present as f64 / denom).round() as u32
    };

    let trend = records
        .iter()
        .take(TREND_WINDOW)
        .map(|r| TrendPoint {
            label: r.captured_at.with_timezone(tz).date_naive().format("%b %-d").to_string(),
            present: r.present_count(),
            absent: r.absent_count(),
        })
        .collect();

    let last_session_absentees = records.first().map_or(0, AttendanceRecord::absent_count);

    HistorySummary {
        session_count,
        average_attendance_pct,
        trend,
        last_session_absentees,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use crate::testing::record_at;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("s{i}")).collect()
    }

    fn record_with(id: &str, minute: u32, present: usize, roster: usize) -> AttendanceRecord {
        let present = ids(present);
        let refs: Vec<&str> = present.iter().map(String::as_str).collect();
        record_at(id, minute, &refs, roster)
    }

    #[test]
    fn test_average_of_three_sessions() {
        let records = vec![
            record_with("c", 3, 10, 10),
            record_with("b", 2, 5, 10),
            record_with("a", 1, 0, 10),
        ];
        let summary = summarize(&records, 10);
        assert_eq!(summary.session_count, 3);
        assert_eq!(summary.average_attendance_pct, 50);
    }

    #[test]
    fn test_empty_history() {
        let summary = summarize(&[], 12);
        assert_eq!(summary.session_count, 0);
        assert_eq!(summary.average_attendance_pct, 0);
        assert!(summary.trend.is_empty());
        assert_eq!(summary.last_session_absentees, 0);
    }

    #[test]
    fn test_zero_roster_does_not_divide_by_zero() {
        let records = vec![record_with("a", 1, 1, 1)];
        // Roster emptied after the session: denominator clamps to 1.
        assert_eq!(summarize(&records, 0).average_attendance_pct, 100);
    }

    #[test]
    fn test_average_rounds_half_up() {
        // 1 of 8 present = 12.5% -> 13
        let records = vec![record_with("a", 1, 1, 8)];
        assert_eq!(summarize(&records, 8).average_attendance_pct, 13);
    }

    #[test]
    fn test_trend_window_keeps_input_order() {
        let records: Vec<_> = (0..10u32)
            .rev()
            .map(|m| record_with(&format!("r{m}"), m, m as usize % 4, 5))
            .collect();
        let summary = summarize(&records, 5);

        assert_eq!(summary.trend.len(), TREND_WINDOW);
        let presents: Vec<usize> = summary.trend.iter().map(|t| t.present).collect();
        assert_eq!(presents, vec![1, 0, 3, 2, 1, 0, 3]);
        assert!(summary.trend.iter().all(|t| t.present + t.absent == 5));
    }

    #[test]
    fn test_trend_uses_roster_size_at_capture() {
        let records = vec![record_with("new", 2, 3, 8), record_with("old", 1, 3, 4)];
        let summary = summarize(&records, 20);
        assert_eq!(summary.trend[0].absent, 5);
        assert_eq!(summary.trend[1].absent, 1);
        assert_eq!(summary.last_session_absentees, 5);
    }

    #[test]
    fn test_trend_label_format() {
        let records = vec![record_with("a", 1, 0, 1)];
        // record_at anchors captures on 2024-03-05 10:xx UTC.
        assert_eq!(summarize_in(&records, 1, &Utc).trend[0].label, "Mar 5");
    }

    #[test]
    fn test_trend_label_follows_timezone() {
        let records = vec![record_with("a", 1, 0, 1)];
        let west = FixedOffset::west_opt(11 * 3600).unwrap();
        let east = FixedOffset::east_opt(14 * 3600).unwrap();
        assert_eq!(summarize_in(&records, 1, &west).trend[0].label, "Mar 4");
        assert_eq!(summarize_in(&records, 1, &east).trend[0].label, "Mar 6");

        let local = records[0].captured_at.with_timezone(&Local).format("%b %-d").to_string();
        assert_eq!(summarize(&records, 1).trend[0].label, local);
    }

    #[test]
    fn test_sort_breaks_ties_by_id() {
        let mut records = vec![
            record_with("b", 7, 0, 1),
            record_with("a", 7, 0, 1),
            record_with("z", 9, 0, 1),
        ];
        sort_most_recent_first(&mut records);
        let order: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["z", "a", "b"]);
    }
}
