// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Apply the database schema to the configured PostgreSQL backend

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use slotkeeper_core::domain::repository::StorageBackend;
use slotkeeper_core::domain::scheduler_config::SchedulerConfigManifest;
use slotkeeper_core::infrastructure::db::{Database, MIGRATOR};

#[derive(Args, Debug, Clone)]
pub struct MigrateCommand {
    /// List pending migrations without applying them
    #[arg(long)]
    dry_run: bool,
}

pub async fn execute(cmd: MigrateCommand, config: &SchedulerConfigManifest) -> Result<()> {
    println!("{}", "slotkeeper Migrate".bold().green());

    let StorageBackend::PostgreSQL(pg) = config.storage_backend()? else {
        bail!("Migrations need the postgres backend; set spec.storage.backend or SLOTKEEPER_DATABASE_URL");
    };

    println!("Connecting to database...");
    let db = Database::new(&pg.connection_string, 1)
        .await
        .context("Failed to connect to database")?;

    let applied_count = db
        .applied_migrations()
        .await
        .context("Failed to read migration status")?;
    let total_migrations = MIGRATOR.iter().count();

    println!(
        "Migration status: {} applied, {} total available.",
        applied_count, total_migrations
    );

    if applied_count >= total_migrations {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in MIGRATOR.iter().skip(applied_count) {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    db.migrate().await?;
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}
