// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Claim Coordinator Application Service
//!
//! Runs the claim and cancel protocols against a [`ResourceStore`]:
//! - Domain layer: Activity/Agent aggregates, OverlapValidator
//! - Infrastructure layer: ResourceStore transaction, EventBus
//!
//! Each attempt opens one store transaction. Every check and every write of
//! an attempt happens inside it, so the outcome a caller sees is exactly the
//! state that was committed (or nothing, on rejection or failure).
//!
//! Business rejections come back as [`ClaimResult`] / [`CancelResult`] data.
//! Store failures never escape as errors; they are logged and reported as the
//! `Error` status after the transaction has rolled back.

use crate::domain::activity::ActivityId;
use crate::domain::agent::AgentId;
use crate::domain::claim::{CancelResult, CancelStatus, ClaimResult, ClaimStatus};
use crate::domain::events::ClaimEvent;
use crate::domain::overlap::OverlapValidator;
use crate::domain::repository::{ClaimTransaction, LockingStrategy, ResourceStore, StoreError};
use crate::domain::scheduler_config::ClaimsConfig;
use crate::infrastructure::event_bus::EventBus;
use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait ClaimService: Send + Sync {
    /// Reserve one slot of `activity_id` for `agent_id`
    async fn claim(&self, activity_id: ActivityId, agent_id: AgentId) -> ClaimResult;

    /// Withdraw `agent_id` from `activity_id`.
    ///
    /// The activity also leaves the agent's commitments, so its window no
    /// longer blocks overlapping claims. The slot itself returns to the pool
    /// only when [`ClaimPolicy::restore_slot_on_cancel`] is set.
    async fn cancel(&self, activity_id: ActivityId, agent_id: AgentId) -> CancelResult;
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClaimPolicy {
    /// Extra attempts after a write conflict. Each attempt re-reads all state,
    /// so a caller that lost the last slot still ends with `FullyBooked`.
    pub conflict_retries: u32,

    /// Return the slot to the pool when a participant cancels
    pub restore_slot_on_cancel: bool,
}

impl ClaimPolicy {
    pub fn from_config(config: &ClaimsConfig, locking: LockingStrategy) -> Self {
        Self {
            conflict_retries: config.effective_conflict_retries(locking),
            restore_slot_on_cancel: config.restore_slot_on_cancel,
        }
    }
}

// ============================================================================
// Standard Implementation
// ============================================================================

enum ClaimAttempt {
    Claimed { remaining_slots: u32 },
    Rejected(ClaimStatus),
}

enum CancelAttempt {
    Cancelled,
    Rejected(CancelStatus),
}

pub struct ClaimCoordinator {
    store: Arc<dyn ResourceStore>,
    event_bus: Arc<EventBus>,
    policy: ClaimPolicy,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn ResourceStore>, event_bus: Arc<EventBus>, policy: ClaimPolicy) -> Self {
        Self {
            store,
            event_bus,
            policy,
        }
    }

    pub fn policy(&self) -> ClaimPolicy {
        self.policy
    }

    async fn attempt_claim(
        &self,
        activity_id: ActivityId,
        agent_id: AgentId,
    ) -> Result<ClaimAttempt, StoreError> {
        let mut tx = self.store.begin(activity_id, agent_id).await?;

        let Some(mut activity) = tx.load_activity().await? else {
            return reject_claim(tx, ClaimStatus::ActivityNotFound).await;
        };

        if !activity.has_capacity() {
            return reject_claim(tx, ClaimStatus::FullyBooked).await;
        }

        if activity.is_participant(agent_id) {
            return reject_claim(tx, ClaimStatus::AlreadyClaimed).await;
        }

        let Some(mut agent) = tx.load_agent().await? else {
            return reject_claim(tx, ClaimStatus::AgentNotFound).await;
        };

        if let Some(conflict) = OverlapValidator::find_conflict(&agent.commitments, &activity.window) {
            debug!(
                activity_id = %activity_id,
                agent_id = %agent_id,
                conflicting_activity_id = %conflict.activity_id,
                "Claim overlaps an existing commitment"
            );
            return reject_claim(tx, ClaimStatus::OverlappingActivity).await;
        }

        activity
            .reserve_slot(agent_id)
            .map_err(|e| StoreError::InvariantViolation(e.to_string()))?;
        agent.commit_to(&activity);

        let remaining_slots = activity.available_slots;
        tx.commit_claim(&activity, &agent).await?;

        Ok(ClaimAttempt::Claimed { remaining_slots })
    }

    async fn attempt_cancel(
        &self,
        activity_id: ActivityId,
        agent_id: AgentId,
    ) -> Result<CancelAttempt, StoreError> {
        let mut tx = self.store.begin(activity_id, agent_id).await?;

        // Read in lock order, report in check order (agent first)
        let activity = tx.load_activity().await?;
        let agent = tx.load_agent().await?;

        let Some(mut agent) = agent else {
            return reject_cancel(tx, CancelStatus::AgentNotFound).await;
        };

        let Some(mut activity) = activity else {
            return reject_cancel(tx, CancelStatus::ActivityNotFound).await;
        };

        if !activity.is_participant(agent_id) {
            return reject_cancel(tx, CancelStatus::NotParticipating).await;
        }

        activity
            .release_participant(agent_id, self.policy.restore_slot_on_cancel)
            .map_err(|e| StoreError::InvariantViolation(e.to_string()))?;
        agent.release(activity_id);

        tx.commit_cancel(&activity, &agent).await?;

        Ok(CancelAttempt::Cancelled)
    }

    fn record_claim(&self, activity_id: ActivityId, agent_id: AgentId, attempt: &ClaimAttempt) {
        let event = match attempt {
            ClaimAttempt::Claimed { remaining_slots } => ClaimEvent::SlotClaimed {
                activity_id,
                agent_id,
                remaining_slots: *remaining_slots,
                claimed_at: Utc::now(),
            },
            ClaimAttempt::Rejected(status) => ClaimEvent::ClaimRejected {
                activity_id,
                agent_id,
                status: *status,
                rejected_at: Utc::now(),
            },
        };
        self.event_bus.publish_claim_event(event);
    }
}

#[async_trait]
impl ClaimService for ClaimCoordinator {
    async fn claim(&self, activity_id: ActivityId, agent_id: AgentId) -> ClaimResult {
        let started = Instant::now();
        let mut conflicts = 0u32;

        let attempt = loop {
            match self.attempt_claim(activity_id, agent_id).await {
                Ok(attempt) => break attempt,
                Err(StoreError::Conflict(reason)) => {
                    counter!("slotkeeper_claim_conflicts_total").increment(1);
                    if conflicts >= self.policy.conflict_retries {
                        debug!(
                            activity_id = %activity_id,
                            agent_id = %agent_id,
                            conflicts,
                            reason = %reason,
                            "Claim lost to a concurrent writer"
                        );
                        break ClaimAttempt::Rejected(ClaimStatus::FullyBooked);
                    }
                    conflicts += 1;
                    debug!(activity_id = %activity_id, agent_id = %agent_id, conflicts, "Retrying claim after write conflict");
                }
                Err(e) => {
                    match &e {
                        StoreError::LockTimeout(_) => {
                            warn!(activity_id = %activity_id, agent_id = %agent_id, error = %e, "Claim timed out waiting for activity lock")
                        }
                        _ => error!(activity_id = %activity_id, agent_id = %agent_id, error = %e, "Claim failed"),
                    }
                    break ClaimAttempt::Rejected(ClaimStatus::Error);
                }
            }
        };

        self.record_claim(activity_id, agent_id, &attempt);

        let result = match attempt {
            ClaimAttempt::Claimed { remaining_slots } => {
                info!(
                    activity_id = %activity_id,
                    agent_id = %agent_id,
                    remaining_slots,
                    "Slot claimed"
                );
                ClaimResult::success()
            }
            ClaimAttempt::Rejected(status) => {
                debug!(activity_id = %activity_id, agent_id = %agent_id, status = %status, "Claim rejected");
                ClaimResult::rejected(status)
            }
        };

        counter!("slotkeeper_claims_total", "status" => result.status.as_str()).increment(1);
        histogram!("slotkeeper_claim_duration_seconds").record(started.elapsed().as_secs_f64());

        result
    }

    async fn cancel(&self, activity_id: ActivityId, agent_id: AgentId) -> CancelResult {
        let mut conflicts = 0u32;

        let attempt = loop {
            match self.attempt_cancel(activity_id, agent_id).await {
                Ok(attempt) => break attempt,
                Err(StoreError::Conflict(reason)) if conflicts < self.policy.conflict_retries => {
                    conflicts += 1;
                    debug!(activity_id = %activity_id, agent_id = %agent_id, conflicts, reason = %reason, "Retrying cancel after write conflict");
                }
                Err(e) => {
                    error!(activity_id = %activity_id, agent_id = %agent_id, error = %e, "Cancel failed");
                    break CancelAttempt::Rejected(CancelStatus::Error);
                }
            }
        };

        let (result, event) = match attempt {
            CancelAttempt::Cancelled => {
                let slot_restored = self.policy.restore_slot_on_cancel;
                info!(activity_id = %activity_id, agent_id = %agent_id, slot_restored, "Claim cancelled");
                (
                    CancelResult::cancelled(),
                    ClaimEvent::ClaimCancelled {
                        activity_id,
                        agent_id,
                        slot_restored,
                        cancelled_at: Utc::now(),
                    },
                )
            }
            CancelAttempt::Rejected(status) => {
                debug!(activity_id = %activity_id, agent_id = %agent_id, status = %status, "Cancel rejected");
                (
                    CancelResult::rejected(status),
                    ClaimEvent::CancelRejected {
                        activity_id,
                        agent_id,
                        status,
                        rejected_at: Utc::now(),
                    },
                )
            }
        };

        self.event_bus.publish_claim_event(event);
        counter!("slotkeeper_cancels_total", "status" => result.status.as_str()).increment(1);

        result
    }
}

async fn reject_claim(
    tx: Box<dyn ClaimTransaction>,
    status: ClaimStatus,
) -> Result<ClaimAttempt, StoreError> {
    abandon(tx).await;
    Ok(ClaimAttempt::Rejected(status))
}

async fn reject_cancel(
    tx: Box<dyn ClaimTransaction>,
    status: CancelStatus,
) -> Result<CancelAttempt, StoreError> {
    abandon(tx).await;
    Ok(CancelAttempt::Rejected(status))
}

/// Nothing was written, so a failed rollback does not change the outcome
async fn abandon(tx: Box<dyn ClaimTransaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback of rejected attempt failed");
    }
}
