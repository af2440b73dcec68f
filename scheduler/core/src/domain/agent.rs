// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use uuid::Uuid;
use serde::{Deserialize, Serialize};
use crate::domain::activity::{Activity, ActivityId, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of an activity held by an agent, used only for overlap checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment {
    pub activity_id: ActivityId,
    pub window: TimeWindow,
}

impl From<&Activity> for Commitment {
    fn from(activity: &Activity) -> Self {
        Self {
            activity_id: activity.id,
            window: activity.window,
        }
    }
}

/// An identity that holds zero or more non-overlapping activity claims.
///
/// No two entries in `commitments` overlap; the claim coordinator checks this
/// before calling [`Agent::commit_to`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub commitments: Vec<Commitment>,
    pub version: u64,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            commitments: Vec::new(),
            version: 0,
        }
    }

    pub fn holds(&self, activity_id: ActivityId) -> bool {
        self.commitments.iter().any(|c| c.activity_id == activity_id)
    }

    pub fn commit_to(&mut self, activity: &Activity) {
        if !self.holds(activity.id) {
            self.commitments.push(Commitment::from(activity));
        }
        self.version += 1;
    }

    /// Returns whether a commitment was removed
    pub fn release(&mut self, activity_id: ActivityId) -> bool {
        let before = self.commitments.len();
        self.commitments.retain(|c| c.activity_id != activity_id);
        let removed = self.commitments.len() != before;
        self.version += 1;
        removed
    }
}
