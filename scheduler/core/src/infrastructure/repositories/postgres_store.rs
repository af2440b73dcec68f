// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Resource Store
//!
//! `ResourceStore` backed by the `activities`, `agents` and `activity_claims`
//! tables (see `migrations/`). Participation and commitments are the same
//! rows viewed from either side: an activity's participants are its
//! `activity_claims`, an agent's commitments are its `activity_claims` joined
//! to the claimed activities' windows.
//!
//! - Pessimistic: `SET LOCAL lock_timeout`, then `FOR UPDATE` on the activity
//!   row and afterwards on the agent row. Every transaction locks in that
//!   order.
//! - Optimistic: plain reads; the commit updates each row only if its
//!   `version` still matches what was read. Zero rows affected is a conflict.
//!
//! Serialization failures, deadlocks and duplicate claim rows surface as
//! `StoreError::Conflict` through `From<sqlx::Error>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgRow, Postgres};
use sqlx::{Row, Transaction};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use crate::domain::activity::{Activity, ActivityId, TimeWindow};
use crate::domain::agent::{Agent, AgentId, Commitment};
use crate::domain::repository::{ClaimTransaction, LockingStrategy, ResourceStore, StoreError};

pub struct PostgresResourceStore {
    pool: PgPool,
    strategy: LockingStrategy,
    lock_timeout: Duration,
}

impl PostgresResourceStore {
    pub fn new(pool: PgPool, strategy: LockingStrategy, lock_timeout: Duration) -> Self {
        Self {
            pool,
            strategy,
            lock_timeout,
        }
    }
}

#[async_trait]
impl ResourceStore for PostgresResourceStore {
    fn locking_strategy(&self) -> LockingStrategy {
        self.strategy
    }

    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO activities (id, title, starts_at, ends_at, available_slots, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at,
                available_slots = EXCLUDED.available_slots,
                version = EXCLUDED.version,
                updated_at = NOW()
            "#,
        )
        .bind(activity.id.0)
        .bind(&activity.title)
        .bind(activity.window.start)
        .bind(activity.window.end)
        .bind(slots_to_db(activity.available_slots)?)
        .bind(version_to_db(activity.version)?)
        .execute(&mut *tx)
        .await?;

        for agent_id in &activity.participants {
            insert_claim_row(&mut tx, activity.id, *agent_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO agents (id, name, version, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                version = EXCLUDED.version,
                updated_at = NOW()
            "#,
        )
        .bind(agent.id.0)
        .bind(&agent.name)
        .bind(version_to_db(agent.version)?)
        .execute(&mut *tx)
        .await?;

        for commitment in &agent.commitments {
            insert_claim_row(&mut tx, commitment.activity_id, agent.id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_activity(&self, id: ActivityId) -> Result<Option<Activity>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_activity(&mut conn, id, false).await
    }

    async fn find_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_agent(&mut conn, id, false).await
    }

    async fn begin(
        &self,
        activity_id: ActivityId,
        agent_id: AgentId,
    ) -> Result<Box<dyn ClaimTransaction>, StoreError> {
        let mut tx = self.pool.begin().await?;

        if self.strategy == LockingStrategy::Pessimistic {
            // SET does not accept bind parameters
            let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
            sqlx::query(&statement).execute(&mut *tx).await?;
        }

        Ok(Box::new(PostgresClaimTransaction {
            tx,
            strategy: self.strategy,
            activity_id,
            agent_id,
            read_activity_version: None,
            read_agent_version: None,
        }))
    }
}

struct PostgresClaimTransaction {
    tx: Transaction<'static, Postgres>,
    strategy: LockingStrategy,
    activity_id: ActivityId,
    agent_id: AgentId,
    read_activity_version: Option<u64>,
    read_agent_version: Option<u64>,
}

impl PostgresClaimTransaction {
    fn locking(&self) -> bool {
        self.strategy == LockingStrategy::Pessimistic
    }

    /// Conditional on the version read earlier in this transaction
    async fn write_activity(&mut self, activity: &Activity) -> Result<(), StoreError> {
        let read = self.read_activity_version.ok_or_else(|| {
            StoreError::InvariantViolation("commit without reading the activity".to_string())
        })?;

        let result = sqlx::query(
            r#"
            UPDATE activities
            SET available_slots = $2, version = $3, updated_at = NOW()
            WHERE id = $1 AND version = $4
            "#,
        )
        .bind(activity.id.0)
        .bind(slots_to_db(activity.available_slots)?)
        .bind(version_to_db(activity.version)?)
        .bind(version_to_db(read)?)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "activity {} changed since version {}",
                activity.id, read
            )));
        }
        Ok(())
    }

    async fn write_agent(&mut self, agent: &Agent) -> Result<(), StoreError> {
        let read = self.read_agent_version.ok_or_else(|| {
            StoreError::InvariantViolation("commit without reading the agent".to_string())
        })?;

        let result = sqlx::query(
            "UPDATE agents SET version = $2, updated_at = NOW() WHERE id = $1 AND version = $3",
        )
        .bind(agent.id.0)
        .bind(version_to_db(agent.version)?)
        .bind(version_to_db(read)?)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "agent {} changed since version {}",
                agent.id, read
            )));
        }
        Ok(())
    }

    fn check_target(&self, activity: &Activity, agent: &Agent) -> Result<(), StoreError> {
        if activity.id != self.activity_id || agent.id != self.agent_id {
            return Err(StoreError::InvariantViolation(
                "commit targets a different activity or agent than the transaction".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ClaimTransaction for PostgresClaimTransaction {
    async fn load_activity(&mut self) -> Result<Option<Activity>, StoreError> {
        let lock = self.locking();
        let activity = fetch_activity(&mut self.tx, self.activity_id, lock).await?;
        self.read_activity_version = activity.as_ref().map(|a| a.version);
        Ok(activity)
    }

    async fn load_agent(&mut self) -> Result<Option<Agent>, StoreError> {
        let lock = self.locking();
        let agent = fetch_agent(&mut self.tx, self.agent_id, lock).await?;
        self.read_agent_version = agent.as_ref().map(|a| a.version);
        Ok(agent)
    }

    async fn commit_claim(
        self: Box<Self>,
        activity: &Activity,
        agent: &Agent,
    ) -> Result<(), StoreError> {
        let mut this = *self;
        this.check_target(activity, agent)?;

        this.write_activity(activity).await?;
        sqlx::query(
            "INSERT INTO activity_claims (activity_id, agent_id, claimed_at) VALUES ($1, $2, NOW())",
        )
        .bind(activity.id.0)
        .bind(agent.id.0)
        .execute(&mut *this.tx)
        .await?;
        this.write_agent(agent).await?;

        this.tx.commit().await?;
        debug!(activity_id = %activity.id, agent_id = %agent.id, "Claim committed");
        Ok(())
    }

    async fn commit_cancel(
        self: Box<Self>,
        activity: &Activity,
        agent: &Agent,
    ) -> Result<(), StoreError> {
        let mut this = *self;
        this.check_target(activity, agent)?;

        this.write_activity(activity).await?;
        let removed = sqlx::query(
            "DELETE FROM activity_claims WHERE activity_id = $1 AND agent_id = $2",
        )
        .bind(activity.id.0)
        .bind(agent.id.0)
        .execute(&mut *this.tx)
        .await?;
        if removed.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "claim of agent {} on activity {} already removed",
                agent.id, activity.id
            )));
        }
        this.write_agent(agent).await?;

        this.tx.commit().await?;
        debug!(activity_id = %activity.id, agent_id = %agent.id, "Cancel committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}

async fn insert_claim_row(
    conn: &mut PgConnection,
    activity_id: ActivityId,
    agent_id: AgentId,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO activity_claims (activity_id, agent_id, claimed_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (activity_id, agent_id) DO NOTHING
        "#,
    )
    .bind(activity_id.0)
    .bind(agent_id.0)
    .execute(conn)
    .await?;
    Ok(())
}

async fn fetch_activity(
    conn: &mut PgConnection,
    id: ActivityId,
    lock: bool,
) -> Result<Option<Activity>, StoreError> {
    let sql = if lock {
        "SELECT id, title, starts_at, ends_at, available_slots, version FROM activities WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, title, starts_at, ends_at, available_slots, version FROM activities WHERE id = $1"
    };

    let Some(row) = sqlx::query(sql).bind(id.0).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };

    let participants: Vec<Uuid> =
        sqlx::query_scalar("SELECT agent_id FROM activity_claims WHERE activity_id = $1")
            .bind(id.0)
            .fetch_all(&mut *conn)
            .await?;

    let mut activity = activity_from_row(&row)?;
    activity.participants = participants.into_iter().map(AgentId).collect::<HashSet<_>>();
    Ok(Some(activity))
}

async fn fetch_agent(
    conn: &mut PgConnection,
    id: AgentId,
    lock: bool,
) -> Result<Option<Agent>, StoreError> {
    let sql = if lock {
        "SELECT id, name, version FROM agents WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, name, version FROM agents WHERE id = $1"
    };

    let Some(row) = sqlx::query(sql).bind(id.0).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };

    let rows = sqlx::query(
        r#"
        SELECT c.activity_id, a.starts_at, a.ends_at
        FROM activity_claims c
        JOIN activities a ON a.id = c.activity_id
        WHERE c.agent_id = $1
        ORDER BY a.starts_at
        "#,
    )
    .bind(id.0)
    .fetch_all(&mut *conn)
    .await?;

    let commitments = rows
        .iter()
        .map(|r| -> Result<Commitment, StoreError> {
            Ok(Commitment {
                activity_id: ActivityId(r.try_get("activity_id")?),
                window: window_from_row(r)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Agent {
        id: AgentId(row.try_get("id")?),
        name: row.try_get("name")?,
        commitments,
        version: version_from_db(row.try_get("version")?)?,
    }))
}

fn activity_from_row(row: &PgRow) -> Result<Activity, StoreError> {
    let slots: i32 = row.try_get("available_slots")?;
    Ok(Activity {
        id: ActivityId(row.try_get("id")?),
        title: row.try_get("title")?,
        window: window_from_row(row)?,
        available_slots: u32::try_from(slots).map_err(|_| {
            StoreError::InvariantViolation(format!("negative available_slots: {}", slots))
        })?,
        participants: HashSet::new(),
        version: version_from_db(row.try_get("version")?)?,
    })
}

fn window_from_row(row: &PgRow) -> Result<TimeWindow, StoreError> {
    let start: DateTime<Utc> = row.try_get("starts_at")?;
    let end: DateTime<Utc> = row.try_get("ends_at")?;
    TimeWindow::new(start, end).map_err(|e| StoreError::InvariantViolation(e.to_string()))
}

fn slots_to_db(slots: u32) -> Result<i32, StoreError> {
    i32::try_from(slots)
        .map_err(|_| StoreError::InvariantViolation(format!("available_slots out of range: {}", slots)))
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::InvariantViolation(format!("version out of range: {}", version)))
}

fn version_from_db(version: i64) -> Result<u64, StoreError> {
    u64::try_from(version)
        .map_err(|_| StoreError::InvariantViolation(format!("negative version: {}", version)))
}
