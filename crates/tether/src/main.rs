// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tether - multi-tenant messaging connection core.
//!
//! This is the binary entry point: the long-running `serve` command plus
//! read-only inspection commands over the local database.

mod inspect;
mod purge;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tether_config::TetherConfig;
use tether_core::TetherError;

/// Tether - multi-tenant messaging connection core.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the registry, the event purge and the read API.
    Serve,
    /// List a tenant's channels with their stored status.
    Channels {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        json: bool,
    },
    /// Show a channel's most recent connection events.
    Events {
        channel: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Summarize a channel's connection health.
    Metrics {
        channel: String,
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Manage Tether configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate the configuration and report every problem found.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Result<TetherConfig, Vec<tether_config::ConfigError>> {
    match path {
        Some(path) => tether_config::load_and_validate_path(path),
        None => tether_config::load_and_validate(),
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tether={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

async fn run(command: Commands, config: TetherConfig) -> Result<(), TetherError> {
    match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Channels { tenant, json } => {
            let db = serve::open_database(&config).await?;
            print!("{}", inspect::channels_command(&db, &tenant, json).await?);
            db.close().await
        }
        Commands::Events {
            channel,
            limit,
            json,
        } => {
            let limit = limit
                .unwrap_or(config.events.default_limit)
                .clamp(1, config.events.max_limit.max(1));
            let db = serve::open_database(&config).await?;
            print!("{}", inspect::events_command(&db, &channel, limit, json).await?);
            db.close().await
        }
        Commands::Metrics {
            channel,
            days,
            json,
        } => {
            let days = days.unwrap_or(config.events.default_metrics_days).max(1);
            let db = serve::open_database(&config).await?;
            print!("{}", inspect::metrics_command(&db, &channel, days, json).await?);
            db.close().await
        }
        Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            tether_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let Some(command) = cli.command else {
        println!("tether: use --help for available commands");
        return;
    };

    if let Commands::Config {
        action: ConfigAction::Check,
    } = command
    {
        println!(
            "tether: configuration is valid (agent.name={}, credentials.backend={:?})",
            config.agent.name, config.credentials.backend
        );
        return;
    }

    init_tracing(&config.agent.log_level);

    if let Err(e) = run(command, config).await {
        eprintln!("tether: {e}");
        std::process::exit(1);
    }
}
