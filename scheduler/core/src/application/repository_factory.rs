// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Store Factory - Application Layer
//!
//! Creates the concrete `ResourceStore` for the configured storage backend,
//! keeping the domain layer free of infrastructure dependencies.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select the store implementation and inject the locking strategy

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tracing::info;

use crate::domain::repository::{LockingStrategy, ResourceStore, StorageBackend};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{InMemoryResourceStore, PostgresResourceStore};

/// Creates a ResourceStore implementation based on the configured backend.
/// The postgres backend opens its own connection pool.
pub async fn create_resource_store(
    backend: &StorageBackend,
    locking: LockingStrategy,
    lock_timeout: Duration,
) -> Result<Arc<dyn ResourceStore>> {
    match backend {
        StorageBackend::InMemory => {
            info!(locking = %locking, "Using in-memory resource store");
            Ok(Arc::new(InMemoryResourceStore::new(locking, lock_timeout)))
        }
        StorageBackend::PostgreSQL(config) => {
            info!(locking = %locking, max_connections = config.max_connections, "Using PostgreSQL resource store");
            let db = Database::new(&config.connection_string, config.max_connections).await?;
            Ok(Arc::new(PostgresResourceStore::new(
                db.get_pool().clone(),
                locking,
                lock_timeout,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_backend_carries_strategy() {
        let store = create_resource_store(
            &StorageBackend::InMemory,
            LockingStrategy::Optimistic,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(store.locking_strategy(), LockingStrategy::Optimistic);
    }
}
