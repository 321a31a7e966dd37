/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! jobrelay CLI - operator tooling for a worker's durable outbox.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// jobrelay - inspect and maintain the outbox of lifecycle calls awaiting delivery
#[derive(Parser)]
#[command(name = "jobrelay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database holding the outbox (can also be set via DATABASE_URL)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// TOML configuration file (can also be set via JOBRELAY_CONFIG)
    #[arg(long, env = "JOBRELAY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands for the outbox
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Show pending messages per outbox and group, and the backlog health
    OutboxStats,

    /// Delete messages, and their content files, created before a cutoff
    PurgeOutbox {
        /// Age of the oldest message to keep (e.g. "48h", "7d12h30m").
        /// Defaults to the configured message expiration timeout.
        #[arg(long)]
        older_than: Option<String>,

        /// Report what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Admin { command } => {
            let database_url = cli.database_url.context(
                "Database URL is required. Set --database-url or DATABASE_URL environment variable",
            )?;
            match command {
                AdminCommands::OutboxStats => {
                    commands::outbox_stats::run(&database_url, &config).await?;
                }
                AdminCommands::PurgeOutbox {
                    older_than,
                    dry_run,
                } => {
                    commands::purge_outbox::run(
                        &database_url,
                        &config,
                        older_than.as_deref(),
                        dry_run,
                    )
                    .await?;
                }
            }
        }
    }

    Ok(())
}
