// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Claim Result Taxonomy
//!
//! Expected business outcomes of a claim or a cancellation are returned as
//! data, never as errors, so callers branch on `status` without error
//! handling machinery. The boundary layer maps these to transport responses.
//!
//! | Claim status | Meaning |
//! |--------------|---------|
//! | `Success` | Slot reserved, membership and commitment recorded |
//! | `ActivityNotFound` | No activity with that id |
//! | `AgentNotFound` | No agent with that id |
//! | `FullyBooked` | No slot left, or the last slot was lost to a concurrent writer |
//! | `AlreadyClaimed` | Agent already participates |
//! | `OverlappingActivity` | Agent holds an activity whose window intersects |
//! | `Error` | Infrastructure failure; the attempt was rolled back |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Success,
    ActivityNotFound,
    AgentNotFound,
    FullyBooked,
    AlreadyClaimed,
    OverlappingActivity,
    Error,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Success => "success",
            ClaimStatus::ActivityNotFound => "activity_not_found",
            ClaimStatus::AgentNotFound => "agent_not_found",
            ClaimStatus::FullyBooked => "fully_booked",
            ClaimStatus::AlreadyClaimed => "already_claimed",
            ClaimStatus::OverlappingActivity => "overlapping_activity",
            ClaimStatus::Error => "error",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            ClaimStatus::Success => "",
            ClaimStatus::ActivityNotFound => "Activity not found.",
            ClaimStatus::AgentNotFound => "Agent not found.",
            ClaimStatus::FullyBooked => "Activity is fully booked.",
            ClaimStatus::AlreadyClaimed => "You have already claimed this activity.",
            ClaimStatus::OverlappingActivity => {
                "You have already claimed another activity that overlaps with this time."
            }
            ClaimStatus::Error => "An unexpected error occurred.",
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single claim attempt.
///
/// `success` duplicates `status == Success` as a fast-path flag; `message`
/// is only present on failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub status: ClaimStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClaimResult {
    pub fn success() -> Self {
        Self {
            status: ClaimStatus::Success,
            success: true,
            message: None,
        }
    }

    pub fn failure(status: ClaimStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            message: Some(message.into()),
        }
    }

    /// Failure carrying the standard message for `status`
    pub fn rejected(status: ClaimStatus) -> Self {
        if status == ClaimStatus::Success {
            return Self::success();
        }
        Self::failure(status, status.default_message())
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStatus {
    Cancelled,
    AgentNotFound,
    ActivityNotFound,
    NotParticipating,
    Error,
}

impl CancelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelStatus::Cancelled => "cancelled",
            CancelStatus::AgentNotFound => "agent_not_found",
            CancelStatus::ActivityNotFound => "activity_not_found",
            CancelStatus::NotParticipating => "not_participating",
            CancelStatus::Error => "error",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            CancelStatus::Cancelled => "",
            CancelStatus::AgentNotFound => "Agent not found.",
            CancelStatus::ActivityNotFound => "Activity not found.",
            CancelStatus::NotParticipating => "Agent is not participating in this activity.",
            CancelStatus::Error => "An unexpected error occurred.",
        }
    }
}

impl std::fmt::Display for CancelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a cancellation, shaped like [`ClaimResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub status: CancelStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CancelResult {
    pub fn cancelled() -> Self {
        Self {
            status: CancelStatus::Cancelled,
            success: true,
            message: None,
        }
    }

    pub fn failure(status: CancelStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn rejected(status: CancelStatus) -> Self {
        if status == CancelStatus::Cancelled {
            return Self::cancelled();
        }
        Self::failure(status, status.default_message())
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_no_message() {
        let result = ClaimResult::success();
        assert!(result.is_success());
        assert_eq!(result.status, ClaimStatus::Success);
        assert!(result.message.is_none());
    }

    #[test]
    fn test_rejected_uses_standard_message() {
        let result = ClaimResult::rejected(ClaimStatus::FullyBooked);
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Activity is fully booked."));

        assert_eq!(ClaimResult::rejected(ClaimStatus::Success), ClaimResult::success());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_value(ClaimResult::rejected(ClaimStatus::OverlappingActivity)).unwrap();
        assert_eq!(json["status"], "overlapping_activity");
        assert_eq!(json["success"], false);

        let json = serde_json::to_value(CancelResult::cancelled()).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_cancel_rejection_messages() {
        let result = CancelResult::rejected(CancelStatus::NotParticipating);
        assert!(!result.is_success());
        assert_eq!(
            result.message.as_deref(),
            Some("Agent is not participating in this activity.")
        );
        assert_eq!(CancelResult::rejected(CancelStatus::Cancelled), CancelResult::cancelled());
    }
}
