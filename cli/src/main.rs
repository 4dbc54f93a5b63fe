// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # BTP Allocation CLI
//!
//! The `btp` binary runs the allocation HTTP service and the handful of
//! administrative jobs that have no web surface.
//!
//! ## Commands
//!
//! - `btp serve` - Run the HTTP API (and the periodic finalize sweep if configured)
//! - `btp finalize` - Run one finalize sweep against the configured storage
//! - `btp user create` - Provision an account of any role, including admin
//! - `btp config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use btp_allocation::commands::{self, ConfigCommand, ServeArgs, UserCommand};

/// BTP Allocation - match final-year students to faculty projects
#[derive(Parser)]
#[command(name = "btp")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "BTP_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true, env = "BTP_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text or json); defaults to the config value
    #[arg(long, global = true, env = "BTP_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Promote temporarily confirmed choices whose window has elapsed
    #[command(name = "finalize")]
    Finalize,

    /// Account administration
    #[command(name = "user")]
    User {
        #[command(subcommand)]
        command: UserCommand,
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
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logging settings fall back to the config file, which may not load yet.
    let observability = btp_allocation::load_config(cli.config.clone())
        .map(|c| c.spec.observability)
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&observability.log_level);
    let format = cli.log_format.as_deref().unwrap_or(&observability.log_format);
    init_logging(level, format)?;

    match cli.command {
        Some(Commands::Serve(args)) => commands::serve::execute(args, cli.config).await,
        Some(Commands::Finalize) => commands::finalize::execute(cli.config).await,
        Some(Commands::User { command }) => commands::user::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(false).init();
    } else {
        builder.with_target(false).compact().init();
    }

    Ok(())
}
