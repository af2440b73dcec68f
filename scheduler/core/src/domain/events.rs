// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::domain::activity::ActivityId;
use crate::domain::agent::AgentId;
use crate::domain::claim::{CancelStatus, ClaimStatus};

/// Outcomes of the claim protocol, published after the store has committed
/// or rolled back. Consumers never observe an event for uncommitted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimEvent {
    SlotClaimed {
        activity_id: ActivityId,
        agent_id: AgentId,
        remaining_slots: u32,
        claimed_at: DateTime<Utc>,
    },
    ClaimRejected {
        activity_id: ActivityId,
        agent_id: AgentId,
        status: ClaimStatus,
        rejected_at: DateTime<Utc>,
    },
    ClaimCancelled {
        activity_id: ActivityId,
        agent_id: AgentId,
        slot_restored: bool,
        cancelled_at: DateTime<Utc>,
    },
    CancelRejected {
        activity_id: ActivityId,
        agent_id: AgentId,
        status: CancelStatus,
        rejected_at: DateTime<Utc>,
    },
}

impl ClaimEvent {
    pub fn activity_id(&self) -> ActivityId {
        match self {
            ClaimEvent::SlotClaimed { activity_id, .. }
            | ClaimEvent::ClaimRejected { activity_id, .. }
            | ClaimEvent::ClaimCancelled { activity_id, .. }
            | ClaimEvent::CancelRejected { activity_id, .. } => *activity_id,
        }
    }

    pub fn agent_id(&self) -> AgentId {
        match self {
            ClaimEvent::SlotClaimed { agent_id, .. }
            | ClaimEvent::ClaimRejected { agent_id, .. }
            | ClaimEvent::ClaimCancelled { agent_id, .. }
            | ClaimEvent::CancelRejected { agent_id, .. } => *agent_id,
        }
    }
}
