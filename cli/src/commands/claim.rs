// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Single claim and cancel commands
//!
//! Both exit non-zero when the outcome is not a success, so scripts can
//! branch on the exit code and read the JSON body for the status.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use slotkeeper_core::application::ClaimService;
use slotkeeper_core::domain::activity::ActivityId;
use slotkeeper_core::domain::agent::AgentId;
use slotkeeper_core::domain::scheduler_config::{SchedulerConfigManifest, StorageBackendKind};

use super::build_coordinator;

#[derive(Args, Debug, Clone)]
pub struct ClaimArgs {
    /// Activity identifier (UUID)
    #[arg(long, value_name = "UUID")]
    pub activity: String,

    /// Agent identifier (UUID)
    #[arg(long, value_name = "UUID")]
    pub agent: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl ClaimArgs {
    /// Malformed identifiers are a caller error, not a claim outcome
    pub fn ids(&self) -> Result<(ActivityId, AgentId)> {
        let activity_id = ActivityId::from_string(&self.activity)
            .with_context(|| format!("Invalid activity id: {}", self.activity))?;
        let agent_id = AgentId::from_string(&self.agent)
            .with_context(|| format!("Invalid agent id: {}", self.agent))?;
        Ok((activity_id, agent_id))
    }
}

fn warn_if_ephemeral(config: &SchedulerConfigManifest) {
    if config.spec.storage.backend == StorageBackendKind::InMemory {
        eprintln!(
            "{}",
            "Using the in-memory backend: state starts empty and is discarded on exit.".yellow()
        );
    }
}

pub async fn claim(args: ClaimArgs, config: &SchedulerConfigManifest) -> Result<()> {
    let (activity_id, agent_id) = args.ids()?;
    warn_if_ephemeral(config);

    let coordinator = build_coordinator(config).await?;
    let result = coordinator.claim(activity_id, agent_id).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.is_success() {
        println!("{}", format!("✓ Claimed activity {} for agent {}", activity_id, agent_id).green());
    } else {
        println!(
            "{} {}",
            format!("✗ {}", result.status).red(),
            result.message.as_deref().unwrap_or_default()
        );
    }

    if !result.is_success() {
        std::process::exit(2);
    }
    Ok(())
}

pub async fn cancel(args: ClaimArgs, config: &SchedulerConfigManifest) -> Result<()> {
    let (activity_id, agent_id) = args.ids()?;
    warn_if_ephemeral(config);

    let coordinator = build_coordinator(config).await?;
    let result = coordinator.cancel(activity_id, agent_id).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.is_success() {
        let note = if coordinator.policy().restore_slot_on_cancel {
            "slot returned to pool"
        } else {
            "slot not returned to pool"
        };
        println!(
            "{}",
            format!("✓ Cancelled agent {} on activity {} ({})", agent_id, activity_id, note).green()
        );
    } else {
        println!(
            "{} {}",
            format!("✗ {}", result.status).red(),
            result.message.as_deref().unwrap_or_default()
        );
    }

    if !result.is_success() {
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_rejects_malformed_uuid() {
        let args = ClaimArgs {
            activity: "not-a-uuid".to_string(),
            agent: uuid::Uuid::new_v4().to_string(),
            json: false,
        };
        let err = args.ids().unwrap_err();
        assert!(err.to_string().contains("Invalid activity id"));

        let args = ClaimArgs {
            activity: uuid::Uuid::new_v4().to_string(),
            agent: uuid::Uuid::new_v4().to_string(),
            json: true,
        };
        assert!(args.ids().is_ok());
    }
}
