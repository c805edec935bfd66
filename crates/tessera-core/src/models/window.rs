//! Temporal validity windows.
//!
//! Pools and entitlements are valid over a half-open interval
//! `[start, end)`. An instant equal to `end` is already outside the
//! window, so two back-to-back windows (one ending and one starting at
//! the same instant) cover a date range without overlap or gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open validity interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TemporalWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// True if `at` falls inside the window. The start instant is
    /// inside, the end instant is not.
    pub fn active_on(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// An empty window contains no instant at all.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Overlap of two windows, or `None` when they do not intersect.
    pub fn intersect(&self, other: &TemporalWindow) -> Option<TemporalWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(TemporalWindow { start, end })
        } else {
            None
        }
    }

    /// The earliest boundary (start or end) strictly after `at`, if
    /// any. Used when walking a timeline of status changes.
    pub fn earliest_boundary_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.start > at {
            Some(self.start)
        } else if self.end > at {
            Some(self.end)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn start_is_inside_end_is_outside() {
        let w = TemporalWindow::new(date(2024, 1, 1), date(2024, 2, 1));
        assert!(w.active_on(date(2024, 1, 1)));
        assert!(w.active_on(date(2024, 1, 31)));
        assert!(!w.active_on(date(2024, 2, 1)));
        assert!(!w.active_on(date(2023, 12, 31)));
    }

    #[test]
    fn adjacent_windows_do_not_overlap() {
        let a = TemporalWindow::new(date(2024, 1, 1), date(2024, 2, 1));
        let b = TemporalWindow::new(date(2024, 2, 1), date(2024, 3, 1));
        assert!(a.intersect(&b).is_none());
        // Exactly one of the two windows is active at the shared
        // boundary.
        let boundary = date(2024, 2, 1);
        assert!(!a.active_on(boundary));
        assert!(b.active_on(boundary));
    }

    #[test]
    fn intersect_returns_overlap() {
        let a = TemporalWindow::new(date(2024, 1, 1), date(2024, 6, 1));
        let b = TemporalWindow::new(date(2024, 3, 1), date(2024, 9, 1));
        let overlap = a.intersect(&b).unwrap();
        assert_eq!(overlap.start, date(2024, 3, 1));
        assert_eq!(overlap.end, date(2024, 6, 1));
    }

    #[test]
    fn empty_window_contains_nothing() {
        let w = TemporalWindow::new(date(2024, 2, 1), date(2024, 1, 1));
        assert!(w.is_empty());
        assert!(!w.active_on(date(2024, 1, 15)));
    }

    #[test]
    fn earliest_boundary_walks_forward() {
        let w = TemporalWindow::new(date(2024, 1, 1), date(2024, 2, 1));
        assert_eq!(
            w.earliest_boundary_after(date(2023, 12, 1)),
            Some(date(2024, 1, 1))
        );
        assert_eq!(
            w.earliest_boundary_after(date(2024, 1, 1)),
            Some(date(2024, 2, 1))
        );
        assert_eq!(w.earliest_boundary_after(date(2024, 2, 1)), None);
    }
}
