// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Overlap Validator
//!
//! Pure predicate over half-open intervals. Two windows `[s1, e1)` and
//! `[s2, e2)` overlap iff `s1 < e2 && s2 < e1`, so back-to-back windows that
//! share only an endpoint do not conflict.

use crate::domain::activity::TimeWindow;
use crate::domain::agent::Commitment;

pub fn windows_overlap(a: &TimeWindow, b: &TimeWindow) -> bool {
    a.start < b.end && b.start < a.end
}

pub struct OverlapValidator;

impl OverlapValidator {
    /// First commitment that intersects `candidate`, if any
    pub fn find_conflict<'a>(
        commitments: &'a [Commitment],
        candidate: &TimeWindow,
    ) -> Option<&'a Commitment> {
        commitments
            .iter()
            .find(|existing| windows_overlap(&existing.window, candidate))
    }

    pub fn overlaps(commitments: &[Commitment], candidate: &TimeWindow) -> bool {
        Self::find_conflict(commitments, candidate).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::ActivityId;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 7, hour, minute, 0).unwrap()
    }

    fn window(start: (u32, u32), end: (u32, u32)) -> TimeWindow {
        TimeWindow::new(at(start.0, start.1), at(end.0, end.1)).unwrap()
    }

    fn commitment(start: (u32, u32), end: (u32, u32)) -> Commitment {
        Commitment {
            activity_id: ActivityId::new(),
            window: window(start, end),
        }
    }

    #[test]
    fn test_partial_overlap_detected_both_ways() {
        let a = window((10, 0), (12, 0));
        let b = window((11, 0), (13, 0));
        assert!(windows_overlap(&a, &b));
        assert!(windows_overlap(&b, &a));
    }

    #[test]
    fn test_containment_overlaps() {
        let outer = window((9, 0), (17, 0));
        let inner = window((12, 0), (12, 30));
        assert!(windows_overlap(&outer, &inner));
        assert!(windows_overlap(&inner, &outer));
    }

    #[test]
    fn test_adjacent_windows_do_not_overlap() {
        let morning = window((10, 0), (12, 0));
        let noon = window((12, 0), (13, 0));
        assert!(!windows_overlap(&morning, &noon));
        assert!(!windows_overlap(&noon, &morning));
    }

    #[test]
    fn test_validator_scans_every_commitment() {
        let held = vec![
            commitment((8, 0), (9, 0)),
            commitment((13, 0), (14, 0)),
            commitment((10, 0), (12, 0)),
        ];

        let conflict = OverlapValidator::find_conflict(&held, &window((11, 0), (13, 0)));
        assert_eq!(conflict.map(|c| c.activity_id), Some(held[2].activity_id));

        assert!(!OverlapValidator::overlaps(&held, &window((14, 0), (15, 0))));
        assert!(!OverlapValidator::overlaps(&[], &window((0, 0), (23, 0))));
    }
}
