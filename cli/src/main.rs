// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # slotkeeper CLI
//!
//! Operator entry point for the slot-claim coordinator.
//!
//! ## Commands
//!
//! - `slotkeeper claim|cancel --activity <id> --agent <id>` - Run one claim or cancellation
//! - `slotkeeper simulate --slots N --agents M` - Contend M agents for N slots in memory
//! - `slotkeeper migrate` - Apply the database schema
//! - `slotkeeper config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use slotkeeper_cli::commands::{self, ClaimArgs, ConfigCommand, MigrateCommand, SimulateCommand};
use slotkeeper_core::domain::scheduler_config::{LoggingConfig, SchedulerConfigManifest};

/// slotkeeper - concurrency-safe activity slot claims
#[derive(Parser)]
#[command(name = "slotkeeper")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SLOTKEEPER_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "SLOTKEEPER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Claim one slot of an activity for an agent
    #[command(name = "claim")]
    Claim {
        #[command(flatten)]
        args: ClaimArgs,
    },

    /// Withdraw an agent from an activity
    #[command(name = "cancel")]
    Cancel {
        #[command(flatten)]
        args: ClaimArgs,
    },

    /// Run concurrent claims against one in-memory activity
    #[command(name = "simulate")]
    Simulate {
        #[command(flatten)]
        command: SimulateCommand,
    },

    /// Apply database migrations
    #[command(name = "migrate")]
    Migrate {
        #[command(flatten)]
        command: MigrateCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Config errors surface after logging is up, so they get reported
    let config = SchedulerConfigManifest::load_or_default(cli.config.clone());
    let logging = config
        .as_ref()
        .map(|c| c.logging())
        .unwrap_or_default();
    init_logging(cli.log_level.as_deref(), &logging)?;

    match cli.command {
        Some(Commands::Claim { args }) => {
            let config = config.context("Failed to load configuration")?;
            commands::claim::claim(args, &config).await
        }
        Some(Commands::Cancel { args }) => {
            let config = config.context("Failed to load configuration")?;
            commands::claim::cancel(args, &config).await
        }
        Some(Commands::Simulate { command }) => {
            let config = config.context("Failed to load configuration")?;
            commands::simulate::execute(command, &config).await
        }
        Some(Commands::Migrate { command }) => {
            let config = config.context("Failed to load configuration")?;
            commands::migrate::execute(command, &config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level_override: Option<&str>, logging: &LoggingConfig) -> Result<()> {
    let level = level_override.unwrap_or(&logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
