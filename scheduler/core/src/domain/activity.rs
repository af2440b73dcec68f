// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Activity Aggregate
//!
//! A scheduled, capacity-limited activity. Its slot counter and participant
//! set are the shared mutable state that the claim protocol guards.
//!
//! # Invariants
//!
//! - `available_slots` never goes below zero (it is a `u32`, and
//!   [`Activity::reserve_slot`] refuses to decrement past zero).
//! - An agent appears in `participants` at most once.
//! - `window.start < window.end`, enforced by [`TimeWindow::new`]. The claim
//!   core does not re-validate this.

use uuid::Uuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use crate::domain::agent::AgentId;

// ============================================================================
// Value Objects
// ============================================================================

/// Unique identifier for an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub Uuid);

impl ActivityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, rejecting empty or inverted ranges
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ActivityError> {
        if end <= start {
            return Err(ActivityError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivityError {
    #[error("End time must be later than start time (start: {start}, end: {end})")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Activity has no available slots")]
    NoCapacity,

    #[error("Agent {0} already participates in this activity")]
    AlreadyParticipating(AgentId),

    #[error("Agent {0} is not participating in this activity")]
    NotParticipating(AgentId),
}

// ============================================================================
// Aggregate Root
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    /// Display only
    pub title: String,
    pub window: TimeWindow,
    pub available_slots: u32,
    pub participants: HashSet<AgentId>,
    /// Bumped on every mutation; the optimistic strategy conditions its
    /// commit on this being unchanged since the read.
    pub version: u64,
}

impl Activity {
    pub fn new(title: impl Into<String>, window: TimeWindow, slots: u32) -> Self {
        Self {
            id: ActivityId::new(),
            title: title.into(),
            window,
            available_slots: slots,
            participants: HashSet::new(),
            version: 0,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.available_slots > 0
    }

    pub fn is_participant(&self, agent_id: AgentId) -> bool {
        self.participants.contains(&agent_id)
    }

    /// Take one slot for `agent_id`.
    ///
    /// The slot counter and the participant set change together or not at all.
    pub fn reserve_slot(&mut self, agent_id: AgentId) -> Result<(), ActivityError> {
        if !self.has_capacity() {
            return Err(ActivityError::NoCapacity);
        }
        if self.is_participant(agent_id) {
            return Err(ActivityError::AlreadyParticipating(agent_id));
        }
        self.available_slots -= 1;
        self.participants.insert(agent_id);
        self.version += 1;
        Ok(())
    }

    /// Drop `agent_id` from the participant set.
    ///
    /// With `restore_slot == false` the freed capacity is not returned to the
    /// pool, so `available_slots + participants.len()` shrinks by one.
    pub fn release_participant(
        &mut self,
        agent_id: AgentId,
        restore_slot: bool,
    ) -> Result<(), ActivityError> {
        if !self.participants.remove(&agent_id) {
            return Err(ActivityError::NotParticipating(agent_id));
        }
        if restore_slot {
            self.available_slots += 1;
        }
        self.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn window(start_hour: u32, end_hour: u32) -> TimeWindow {
        let day = Utc.with_ymd_and_hms(2025, 8, 7, 0, 0, 0).unwrap();
        TimeWindow::new(
            day + Duration::hours(start_hour as i64),
            day + Duration::hours(end_hour as i64),
        )
        .unwrap()
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        let start = Utc.with_ymd_and_hms(2025, 8, 7, 12, 0, 0).unwrap();
        assert!(matches!(
            TimeWindow::new(start, start),
            Err(ActivityError::InvalidWindow { .. })
        ));
        assert!(TimeWindow::new(start, start - Duration::minutes(1)).is_err());
        assert_eq!(window(10, 12).duration(), Duration::hours(2));
    }

    #[test]
    fn test_reserve_slot_updates_counter_and_members_together() {
        let mut activity = Activity::new("Library helper", window(10, 12), 2);
        let agent = AgentId::new();

        activity.reserve_slot(agent).unwrap();

        assert_eq!(activity.available_slots, 1);
        assert!(activity.is_participant(agent));
        assert_eq!(activity.version, 1);
    }

    #[test]
    fn test_reserve_slot_rejects_duplicate_and_full() {
        let mut activity = Activity::new("Field trip", window(9, 15), 1);
        let first = AgentId::new();
        activity.reserve_slot(first).unwrap();

        assert_eq!(
            activity.reserve_slot(AgentId::new()),
            Err(ActivityError::NoCapacity)
        );
        assert_eq!(activity.available_slots, 0);

        activity.available_slots = 1;
        assert_eq!(
            activity.reserve_slot(first),
            Err(ActivityError::AlreadyParticipating(first))
        );
        assert_eq!(activity.participants.len(), 1);
    }

    #[test]
    fn test_release_participant_keeps_slot_unless_restored() {
        let mut activity = Activity::new("Bake sale", window(13, 15), 3);
        let a = AgentId::new();
        let b = AgentId::new();
        activity.reserve_slot(a).unwrap();
        activity.reserve_slot(b).unwrap();

        activity.release_participant(a, false).unwrap();
        assert_eq!(activity.available_slots, 1);
        assert!(!activity.is_participant(a));

        activity.release_participant(b, true).unwrap();
        assert_eq!(activity.available_slots, 2);

        assert_eq!(
            activity.release_participant(b, true),
            Err(ActivityError::NotParticipating(b))
        );
    }
}
