// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Contention simulation
//!
//! Seeds one activity with N slots and M agents in an in-memory store, fires
//! all M claims concurrently and checks the outcome against the capacity
//! invariant: exactly `min(N, M)` successes and `N - successes` slots left.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use slotkeeper_core::application::{ClaimCoordinator, ClaimPolicy, ClaimService};
use slotkeeper_core::domain::activity::{Activity, TimeWindow};
use slotkeeper_core::domain::agent::Agent;
use slotkeeper_core::domain::claim::ClaimStatus;
use slotkeeper_core::domain::repository::{LockingStrategy, ResourceStore};
use slotkeeper_core::domain::scheduler_config::SchedulerConfigManifest;
use slotkeeper_core::infrastructure::event_bus::EventBus;
use slotkeeper_core::infrastructure::repositories::InMemoryResourceStore;

#[derive(Args, Debug, Clone)]
pub struct SimulateCommand {
    /// Capacity of the contested activity
    #[arg(long, default_value_t = 5)]
    pub slots: u32,

    /// Number of agents claiming concurrently
    #[arg(long, default_value_t = 30)]
    pub agents: usize,

    /// Locking strategy (defaults to the configured one)
    #[arg(long, value_parser = parse_locking)]
    pub locking: Option<LockingStrategy>,

    /// Conflict retries per claim (optimistic default: one per slot)
    #[arg(long)]
    pub conflict_retries: Option<u32>,
}

fn parse_locking(s: &str) -> Result<LockingStrategy, String> {
    s.parse::<LockingStrategy>().map_err(|e| e.to_string())
}

#[derive(Debug, Default)]
pub struct SimulationReport {
    pub tally: BTreeMap<ClaimStatus, usize>,
    pub remaining_slots: u32,
    pub participants: usize,
    pub elapsed: Duration,
}

impl SimulationReport {
    pub fn successes(&self) -> usize {
        self.tally.get(&ClaimStatus::Success).copied().unwrap_or(0)
    }

    /// Capacity invariant for a fresh activity with `slots` capacity
    pub fn check(&self, slots: u32, agents: usize) -> Result<()> {
        let successes = self.successes();
        let expected = (slots as usize).min(agents);
        if successes != expected {
            bail!("expected {} successful claims, got {}", expected, successes);
        }
        if self.remaining_slots as usize != slots as usize - successes {
            bail!(
                "slot counter is {} but {} of {} slots were claimed",
                self.remaining_slots,
                successes,
                slots
            );
        }
        if self.participants != successes {
            bail!(
                "{} participants recorded for {} successful claims",
                self.participants,
                successes
            );
        }
        Ok(())
    }
}

/// Run the contention scenario; the caller decides how to report it
pub async fn run(
    slots: u32,
    agents: usize,
    locking: LockingStrategy,
    policy: ClaimPolicy,
    lock_timeout: Duration,
) -> Result<SimulationReport> {
    let store = Arc::new(InMemoryResourceStore::new(locking, lock_timeout));
    let start = chrono::Utc::now() + chrono::Duration::days(1);
    let window = TimeWindow::new(start, start + chrono::Duration::hours(2))?;
    let activity = Activity::new("Simulated activity", window, slots);
    store.save_activity(&activity).await?;

    let mut agent_ids = Vec::with_capacity(agents);
    for i in 0..agents {
        let agent = Agent::new(format!("agent-{}", i));
        store.save_agent(&agent).await?;
        agent_ids.push(agent.id);
    }

    let coordinator = Arc::new(ClaimCoordinator::new(
        store.clone(),
        Arc::new(EventBus::with_default_capacity()),
        policy,
    ));

    let started = Instant::now();
    let handles: Vec<_> = agent_ids
        .into_iter()
        .map(|agent_id| {
            let coordinator = coordinator.clone();
            let activity_id = activity.id;
            tokio::spawn(async move { coordinator.claim(activity_id, agent_id).await })
        })
        .collect();

    let mut report = SimulationReport::default();
    for outcome in futures::future::join_all(handles).await {
        let result = outcome.context("Claim task panicked")?;
        *report.tally.entry(result.status).or_insert(0) += 1;
    }
    report.elapsed = started.elapsed();

    let stored = store
        .find_activity(activity.id)
        .await?
        .context("Simulated activity disappeared")?;
    report.remaining_slots = stored.available_slots;
    report.participants = stored.participants.len();

    info!(
        slots,
        agents,
        locking = %locking,
        successes = report.successes(),
        remaining_slots = report.remaining_slots,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Simulation finished"
    );

    Ok(report)
}

pub async fn execute(cmd: SimulateCommand, config: &SchedulerConfigManifest) -> Result<()> {
    let locking = cmd.locking.unwrap_or(config.spec.storage.locking);
    let mut policy = ClaimPolicy::from_config(&config.spec.claims, locking);
    policy.conflict_retries = match (cmd.conflict_retries, locking) {
        (Some(n), _) => n,
        // Every conflict is some other claim committing, so one retry per slot suffices
        (None, LockingStrategy::Optimistic) => policy.conflict_retries.max(cmd.slots),
        (None, LockingStrategy::Pessimistic) => policy.conflict_retries,
    };

    println!(
        "{}",
        format!(
            "Simulating {} agents contending for {} slots ({} locking, {} conflict retries)",
            cmd.agents, cmd.slots, locking, policy.conflict_retries
        )
        .bold()
    );

    let report = run(
        cmd.slots,
        cmd.agents,
        locking,
        policy,
        config.spec.storage.lock_timeout(),
    )
    .await?;

    for (status, count) in &report.tally {
        println!("  {:<22} {}", status.as_str(), count);
    }
    println!("  {:<22} {}", "remaining_slots", report.remaining_slots);
    println!("  {:<22} {:?}", "elapsed", report.elapsed);

    report
        .check(cmd.slots, cmd.agents)
        .context("Capacity invariant violated")?;
    println!("{}", "✓ Capacity invariant held".green());

    Ok(())
}
