// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the slotkeeper CLI

pub mod claim;
pub mod config;
pub mod migrate;
pub mod simulate;

pub use self::claim::ClaimArgs;
pub use self::config::ConfigCommand;
pub use self::migrate::MigrateCommand;
pub use self::simulate::SimulateCommand;

use anyhow::{Context, Result};
use std::sync::Arc;

use slotkeeper_core::application::{create_resource_store, ClaimCoordinator, ClaimPolicy};
use slotkeeper_core::domain::scheduler_config::SchedulerConfigManifest;
use slotkeeper_core::infrastructure::event_bus::EventBus;

/// Validate the configuration and wire a coordinator over the configured store
pub async fn build_coordinator(config: &SchedulerConfigManifest) -> Result<ClaimCoordinator> {
    config.validate().context("Configuration validation failed")?;

    let storage = &config.spec.storage;
    let backend = config.storage_backend()?;
    let store = create_resource_store(&backend, storage.locking, storage.lock_timeout())
        .await
        .context("Failed to open resource store")?;

    let policy = ClaimPolicy::from_config(&config.spec.claims, storage.locking);
    Ok(ClaimCoordinator::new(
        store,
        Arc::new(EventBus::with_default_capacity()),
        policy,
    ))
}
