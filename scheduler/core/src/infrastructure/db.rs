// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into `PostgresResourceStore`, and carries the embedded schema
//! migrations from `migrations/`.

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use anyhow::{Context, Result};
use tracing::info;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations, returning how many were applied
    pub async fn migrate(&self) -> Result<usize> {
        let applied_before = self.applied_migrations().await?;
        MIGRATOR
            .run(&self.pool)
            .await
            .context("Failed to apply migrations")?;
        let applied = MIGRATOR.iter().count().saturating_sub(applied_before);
        info!(applied, "Database schema up to date");
        Ok(applied)
    }

    /// Applied migration count; zero when the bookkeeping table does not exist yet
    pub async fn applied_migrations(&self) -> Result<usize> {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success")
            .fetch_all(&self.pool)
            .await;
        applied_count(rows.map(|rows| rows.len()))
    }
}

fn applied_count(rows: Result<usize, sqlx::Error>) -> Result<usize> {
    match rows {
        Ok(count) => Ok(count),
        Err(e) if is_undefined_table(&e) => Ok(0),
        Err(e) => Err(e).context("Failed to read applied migrations"),
    }
}

/// SQLSTATE 42P01 (undefined_table)
fn is_undefined_table(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "42P01")
}
