// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Store Interface
//!
//! Persistence contract for the two aggregates the claim protocol touches,
//! defined in the domain layer and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Purpose | Implementations |
//! |-------|---------|----------------|
//! | `ResourceStore` | Lookup, seeding, opening atomic units | `InMemoryResourceStore`, `PostgresResourceStore` |
//! | `ClaimTransaction` | One claim or cancel, committed or rolled back as a unit | per store |
//!
//! ## Concurrency Strategy
//!
//! Each store is constructed with a [`LockingStrategy`]. Both strategies give
//! the same observable guarantee: for an activity with capacity C, at most C
//! concurrent claims succeed and the slot counter ends at `C - successes`.
//!
//! - `Pessimistic`: the activity, then the agent, is exclusively locked from
//!   its first read until commit/rollback. Lock waits are bounded by the
//!   store's lock timeout.
//! - `Optimistic`: reads are unlocked; commit is conditioned on the activity
//!   and agent versions being unchanged, otherwise [`StoreError::Conflict`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::domain::activity::{Activity, ActivityId};
use crate::domain::agent::{Agent, AgentId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// Concurrency-control strategy, injected at store construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockingStrategy {
    /// Exclusive row lock held for the whole transaction
    Pessimistic,
    /// Version stamp checked at commit time
    Optimistic,
}

impl LockingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockingStrategy::Pessimistic => "pessimistic",
            LockingStrategy::Optimistic => "optimistic",
        }
    }
}

impl Default for LockingStrategy {
    fn default() -> Self {
        Self::Pessimistic
    }
}

impl std::fmt::Display for LockingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockingStrategy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pessimistic" => Ok(Self::Pessimistic),
            "optimistic" => Ok(Self::Optimistic),
            other => Err(StoreError::Unknown(format!(
                "Invalid locking strategy: '{}'. Expected pessimistic or optimistic",
                other
            ))),
        }
    }
}

/// Authoritative holder of activity and agent state
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Strategy this store was built with
    fn locking_strategy(&self) -> LockingStrategy;

    /// Create or replace an activity (CRUD collaborators, seeding)
    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError>;

    /// Create or replace an agent (CRUD collaborators, seeding)
    async fn save_agent(&self, agent: &Agent) -> Result<(), StoreError>;

    /// Find activity by ID, outside any transaction
    async fn find_activity(&self, id: ActivityId) -> Result<Option<Activity>, StoreError>;

    /// Find agent by ID, outside any transaction
    async fn find_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError>;

    /// Open one atomic unit covering `activity_id` and `agent_id`
    async fn begin(
        &self,
        activity_id: ActivityId,
        agent_id: AgentId,
    ) -> Result<Box<dyn ClaimTransaction>, StoreError>;
}

/// A single claim or cancel in flight.
///
/// Callers must read the activity before the agent; stores rely on that order
/// to take locks without deadlocking. Dropping the transaction without
/// committing rolls it back.
#[async_trait]
pub trait ClaimTransaction: Send {
    /// Read the activity. Under the pessimistic strategy this blocks until the
    /// exclusive lock is held or the lock timeout elapses.
    async fn load_activity(&mut self) -> Result<Option<Activity>, StoreError>;

    /// Read the agent together with its commitments. Under the pessimistic
    /// strategy the agent is locked too, after the activity.
    async fn load_agent(&mut self) -> Result<Option<Agent>, StoreError>;

    /// Persist a claim: `activity` has the slot taken and the agent added,
    /// `agent` has the new commitment.
    async fn commit_claim(
        self: Box<Self>,
        activity: &Activity,
        agent: &Agent,
    ) -> Result<(), StoreError>;

    /// Persist a cancellation: `activity` no longer lists the agent,
    /// `agent` no longer holds the activity.
    async fn commit_cancel(
        self: Box<Self>,
        activity: &Activity,
        agent: &Agent,
    ) -> Result<(), StoreError>;

    /// Abandon every change made in this unit
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another transaction changed the same state first
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Lock wait timed out: {0}")]
    LockTimeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// SQLSTATEs that mean "a concurrent writer won": serialization_failure,
/// deadlock_detected, unique_violation
const CONFLICT_SQLSTATES: &[&str] = &["40001", "40P01", "23505"];

/// lock_not_available, query_canceled (statement/lock timeout)
const TIMEOUT_SQLSTATES: &[&str] = &["55P03", "57014"];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(code) = err.as_database_error().and_then(|db| db.code()) {
            if CONFLICT_SQLSTATES.contains(&code.as_ref()) {
                return StoreError::Conflict(err.to_string());
            }
            if TIMEOUT_SQLSTATES.contains(&code.as_ref()) {
                return StoreError::LockTimeout(err.to_string());
            }
        }
        match err {
            sqlx::Error::PoolTimedOut => StoreError::LockTimeout(err.to_string()),
            _ => StoreError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locking_strategy_parse() {
        assert_eq!("Pessimistic".parse::<LockingStrategy>().unwrap(), LockingStrategy::Pessimistic);
        assert_eq!("optimistic".parse::<LockingStrategy>().unwrap(), LockingStrategy::Optimistic);
        assert!("eventual".parse::<LockingStrategy>().is_err());
        assert_eq!(LockingStrategy::default(), LockingStrategy::Pessimistic);
    }

    #[test]
    fn test_unclassified_driver_error_maps_to_database() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_pool_timeout_maps_to_lock_timeout() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::LockTimeout(_)));
    }
}
