// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource Store Implementations
//!
//! Infrastructure implementations of the `ResourceStore` abstraction defined
//! in the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist activities and agents, run claim transactions
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresResourceStore** - `activities` / `agents` / `activity_claims`
//!   tables, row locks or version columns depending on strategy
//! - **InMemoryResourceStore** - HashMap-backed, for tests, development and
//!   the CLI contention simulation
//!
//! Both honour the same [`LockingStrategy`] contract, so the coordinator's
//! behaviour is identical over either backend.

pub mod postgres_store;

pub use postgres_store::PostgresResourceStore;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use crate::domain::activity::{Activity, ActivityId};
use crate::domain::agent::{Agent, AgentId};
use crate::domain::repository::{ClaimTransaction, LockingStrategy, ResourceStore, StoreError};

#[derive(Default)]
struct Tables {
    activities: HashMap<ActivityId, Activity>,
    agents: HashMap<AgentId, Agent>,
}

struct Shared {
    strategy: LockingStrategy,
    lock_timeout: Duration,
    tables: RwLock<Tables>,
    /// Row locks held by pessimistic transactions, taken activity first
    activity_locks: Mutex<HashMap<ActivityId, Arc<tokio::sync::Mutex<()>>>>,
    agent_locks: Mutex<HashMap<AgentId, Arc<tokio::sync::Mutex<()>>>>,
    failing_commits: AtomicUsize,
}

impl Shared {
    fn activity_lock(&self, id: ActivityId) -> Arc<tokio::sync::Mutex<()>> {
        self.activity_locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn agent_lock(&self, id: AgentId) -> Arc<tokio::sync::Mutex<()>> {
        self.agent_locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn acquire(
        &self,
        lock: Arc<tokio::sync::Mutex<()>>,
        row: String,
    ) -> Result<OwnedMutexGuard<()>, StoreError> {
        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                StoreError::LockTimeout(format!(
                    "{} not available within {:?}",
                    row, self.lock_timeout
                ))
            })
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Clone)]
pub struct InMemoryResourceStore {
    shared: Arc<Shared>,
}

impl InMemoryResourceStore {
    pub fn new(strategy: LockingStrategy, lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                strategy,
                lock_timeout,
                tables: RwLock::new(Tables::default()),
                activity_locks: Mutex::new(HashMap::new()),
                agent_locks: Mutex::new(HashMap::new()),
                failing_commits: AtomicUsize::new(0),
            }),
        }
    }

    /// Make the next `n` commits fail with `StoreError::Database` after all
    /// checks have passed. Test and development use only.
    pub fn fail_next_commits(&self, n: usize) {
        self.shared.failing_commits.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    fn locking_strategy(&self) -> LockingStrategy {
        self.shared.strategy
    }

    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        let mut tables = self.shared.tables.write();
        tables.activities.insert(activity.id, activity.clone());
        Ok(())
    }

    async fn save_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        let mut tables = self.shared.tables.write();
        tables.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn find_activity(&self, id: ActivityId) -> Result<Option<Activity>, StoreError> {
        let tables = self.shared.tables.read();
        Ok(tables.activities.get(&id).cloned())
    }

    async fn find_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        let tables = self.shared.tables.read();
        Ok(tables.agents.get(&id).cloned())
    }

    async fn begin(
        &self,
        activity_id: ActivityId,
        agent_id: AgentId,
    ) -> Result<Box<dyn ClaimTransaction>, StoreError> {
        Ok(Box::new(InMemoryClaimTransaction {
            shared: self.shared.clone(),
            activity_id,
            agent_id,
            activity_guard: None,
            agent_guard: None,
            read_activity_version: None,
            read_agent_version: None,
        }))
    }
}

/// Rollback is free: nothing touches the tables before commit, and dropping
/// the owned guards releases the row locks.
struct InMemoryClaimTransaction {
    shared: Arc<Shared>,
    activity_id: ActivityId,
    agent_id: AgentId,
    activity_guard: Option<OwnedMutexGuard<()>>,
    agent_guard: Option<OwnedMutexGuard<()>>,
    read_activity_version: Option<u64>,
    read_agent_version: Option<u64>,
}

impl InMemoryClaimTransaction {
    fn commit(&self, activity: &Activity, agent: &Agent) -> Result<(), StoreError> {
        if activity.id != self.activity_id || agent.id != self.agent_id {
            return Err(StoreError::InvariantViolation(
                "commit targets a different activity or agent than the transaction".to_string(),
            ));
        }
        let (Some(activity_read), Some(agent_read)) =
            (self.read_activity_version, self.read_agent_version)
        else {
            return Err(StoreError::InvariantViolation(
                "commit without reading both activity and agent".to_string(),
            ));
        };

        if self.shared.take_injected_failure() {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }

        // Version checks and both writes happen under one write lock
        let mut tables = self.shared.tables.write();

        let activity_now = tables.activities.get(&activity.id).map(|a| a.version);
        if activity_now != Some(activity_read) {
            return Err(StoreError::Conflict(format!(
                "activity {} changed since read (read v{}, now {:?})",
                activity.id, activity_read, activity_now
            )));
        }

        let agent_now = tables.agents.get(&agent.id).map(|a| a.version);
        if agent_now != Some(agent_read) {
            return Err(StoreError::Conflict(format!(
                "agent {} changed since read (read v{}, now {:?})",
                agent.id, agent_read, agent_now
            )));
        }

        tables.activities.insert(activity.id, activity.clone());
        tables.agents.insert(agent.id, agent.clone());
        Ok(())
    }
}

#[async_trait]
impl ClaimTransaction for InMemoryClaimTransaction {
    async fn load_activity(&mut self) -> Result<Option<Activity>, StoreError> {
        if self.shared.strategy == LockingStrategy::Pessimistic && self.activity_guard.is_none() {
            let lock = self.shared.activity_lock(self.activity_id);
            let guard = self
                .shared
                .acquire(lock, format!("activity {}", self.activity_id))
                .await?;
            self.activity_guard = Some(guard);
        }

        let activity = self.shared.tables.read().activities.get(&self.activity_id).cloned();
        self.read_activity_version = activity.as_ref().map(|a| a.version);
        Ok(activity)
    }

    async fn load_agent(&mut self) -> Result<Option<Agent>, StoreError> {
        if self.shared.strategy == LockingStrategy::Pessimistic && self.agent_guard.is_none() {
            let lock = self.shared.agent_lock(self.agent_id);
            let guard = self
                .shared
                .acquire(lock, format!("agent {}", self.agent_id))
                .await?;
            self.agent_guard = Some(guard);
        }

        let agent = self.shared.tables.read().agents.get(&self.agent_id).cloned();
        self.read_agent_version = agent.as_ref().map(|a| a.version);
        Ok(agent)
    }

    async fn commit_claim(
        self: Box<Self>,
        activity: &Activity,
        agent: &Agent,
    ) -> Result<(), StoreError> {
        self.commit(activity, agent)?;
        debug!(activity_id = %activity.id, agent_id = %agent.id, "Claim committed");
        Ok(())
    }

    async fn commit_cancel(
        self: Box<Self>,
        activity: &Activity,
        agent: &Agent,
    ) -> Result<(), StoreError> {
        self.commit(activity, agent)?;
        debug!(activity_id = %activity.id, agent_id = %agent.id, "Cancel committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::TimeWindow;
    use chrono::{Duration as ChronoDuration, Utc};

    fn activity(slots: u32) -> Activity {
        let start = Utc::now();
        Activity::new(
            "Beach cleanup",
            TimeWindow::new(start, start + ChronoDuration::hours(2)).unwrap(),
            slots,
        )
    }

    async fn seeded(strategy: LockingStrategy) -> (InMemoryResourceStore, Activity, Agent) {
        let store = InMemoryResourceStore::new(strategy, Duration::from_millis(50));
        let activity = activity(3);
        let agent = Agent::new("jo");
        store.save_activity(&activity).await.unwrap();
        store.save_agent(&agent).await.unwrap();
        (store, activity, agent)
    }

    #[tokio::test]
    async fn test_commit_applies_both_aggregates() {
        let (store, activity, agent) = seeded(LockingStrategy::Optimistic).await;

        let mut tx = store.begin(activity.id, agent.id).await.unwrap();
        let mut a = tx.load_activity().await.unwrap().unwrap();
        let mut g = tx.load_agent().await.unwrap().unwrap();
        a.reserve_slot(agent.id).unwrap();
        g.commit_to(&a);
        tx.commit_claim(&a, &g).await.unwrap();

        assert_eq!(store.find_activity(activity.id).await.unwrap().unwrap().available_slots, 2);
        assert!(store.find_agent(agent.id).await.unwrap().unwrap().holds(activity.id));
    }

    #[tokio::test]
    async fn test_optimistic_commit_detects_stale_read() {
        let (store, activity, agent) = seeded(LockingStrategy::Optimistic).await;

        let mut stale = store.begin(activity.id, agent.id).await.unwrap();
        let mut a = stale.load_activity().await.unwrap().unwrap();
        let g = stale.load_agent().await.unwrap().unwrap();

        let mut bumped = activity.clone();
        bumped.version += 1;
        store.save_activity(&bumped).await.unwrap();

        a.reserve_slot(agent.id).unwrap();
        let err = stale.commit_claim(&a, &g).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(store.find_activity(activity.id).await.unwrap().unwrap().participants.is_empty());
    }

    #[tokio::test]
    async fn test_pessimistic_lock_times_out_while_held() {
        let (store, activity, agent) = seeded(LockingStrategy::Pessimistic).await;

        let mut holder = store.begin(activity.id, agent.id).await.unwrap();
        holder.load_activity().await.unwrap();

        let mut waiter = store.begin(activity.id, AgentId::new()).await.unwrap();
        let err = waiter.load_activity().await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));

        holder.rollback().await.unwrap();
        let mut waiter = store.begin(activity.id, AgentId::new()).await.unwrap();
        assert!(waiter.load_activity().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pessimistic_agent_lock_serializes_claims_on_two_activities() {
        let store = InMemoryResourceStore::new(LockingStrategy::Pessimistic, Duration::from_secs(5));
        let first = activity(3);
        let second = activity(3);
        let agent = Agent::new("jo");
        store.save_activity(&first).await.unwrap();
        store.save_activity(&second).await.unwrap();
        store.save_agent(&agent).await.unwrap();

        let mut t1 = store.begin(first.id, agent.id).await.unwrap();
        let mut a1 = t1.load_activity().await.unwrap().unwrap();
        let mut g1 = t1.load_agent().await.unwrap().unwrap();

        let mut t2 = store.begin(second.id, agent.id).await.unwrap();
        let a2 = t2.load_activity().await.unwrap().unwrap();

        // t2 must wait for the agent until t1 commits, then read the new version
        let waiter = tokio::spawn(async move {
            let g2 = t2.load_agent().await.unwrap().unwrap();
            (t2, a2, g2)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        a1.reserve_slot(agent.id).unwrap();
        g1.commit_to(&a1);
        t1.commit_claim(&a1, &g1).await.unwrap();

        let (t2, mut a2, mut g2) = waiter.await.unwrap();
        assert_eq!(g2.version, 1);
        a2.reserve_slot(agent.id).unwrap();
        g2.commit_to(&a2);
        t2.commit_claim(&a2, &g2).await.unwrap();

        let stored = store.find_agent(agent.id).await.unwrap().unwrap();
        assert!(stored.holds(first.id));
        assert!(stored.holds(second.id));
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_pessimistic_agent_lock_times_out_while_held() {
        let store = InMemoryResourceStore::new(LockingStrategy::Pessimistic, Duration::from_millis(50));
        let first = activity(1);
        let second = activity(1);
        let agent = Agent::new("jo");
        store.save_activity(&first).await.unwrap();
        store.save_activity(&second).await.unwrap();
        store.save_agent(&agent).await.unwrap();

        let mut holder = store.begin(first.id, agent.id).await.unwrap();
        holder.load_activity().await.unwrap();
        holder.load_agent().await.unwrap();

        let mut waiter = store.begin(second.id, agent.id).await.unwrap();
        waiter.load_activity().await.unwrap();
        let err = waiter.load_agent().await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_lock() {
        let (store, activity, agent) = seeded(LockingStrategy::Pessimistic).await;

        {
            let mut tx = store.begin(activity.id, agent.id).await.unwrap();
            tx.load_activity().await.unwrap();
        }

        let mut tx = store.begin(activity.id, agent.id).await.unwrap();
        assert!(tx.load_activity().await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let (store, activity, agent) = seeded(LockingStrategy::Pessimistic).await;
        store.fail_next_commits(1);

        for expect_failure in [true, false] {
            let mut tx = store.begin(activity.id, agent.id).await.unwrap();
            let a = tx.load_activity().await.unwrap().unwrap();
            let g = tx.load_agent().await.unwrap().unwrap();
            let outcome = tx.commit_claim(&a, &g).await;
            assert_eq!(outcome.is_err(), expect_failure);
        }
    }
}
