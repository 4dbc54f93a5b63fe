// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use btp_allocation_core::config::{AllocationConfigManifest, StorageBackendKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./btp-config.yaml)
        #[arg(short, long, default_value = "./btp-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(&output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = crate::load_config(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. BTP_CONFIG_PATH: {}",
            std::env::var("BTP_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./btp-config.yaml");
        println!("  4. ~/.btp/config.yaml");
        println!("  5. /etc/btp/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    println!();

    println!("{}", "Storage:".bold());
    match spec.storage.backend {
        StorageBackendKind::InMemory => println!("  Backend: in-memory {}", "(not persistent)".yellow()),
        StorageBackendKind::Postgres => {
            println!("  Backend: postgres");
            // Never print credentials.
            println!(
                "  Database URL: {}",
                if spec.storage.database_url.is_some() { "(set)" } else { "(missing)" }
            );
            println!("  Max connections: {}", spec.storage.max_connections);
        }
    }
    match &spec.files.root {
        Some(root) => println!("  Uploads: {}", root.display()),
        None => println!("  Uploads: in-memory"),
    }
    println!();

    println!("{}", "Workflow:".bold());
    println!("  Co-guide policy: {:?}", spec.workflow.co_guide_policy);
    println!(
        "  Confirmation window: {}s",
        spec.workflow.confirmation_window.as_secs()
    );
    match spec.workflow.sweep_interval {
        Some(interval) => println!("  Finalize sweep: every {}s", interval.as_secs()),
        None => println!("  Finalize sweep: {}", "manual (btp finalize)".dimmed()),
    }
    println!();

    println!("{}", "Mail:".bold());
    println!("  Transport: {:?}", spec.mail.transport);
    if let Some(endpoint) = &spec.mail.endpoint {
        println!("  Endpoint: {}", endpoint);
    }
    println!("  From: {}", spec.mail.from);
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = crate::load_config(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: &Path) -> Result<()> {
    AllocationConfigManifest::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btp-config.yaml");

        generate(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let manifest: AllocationConfigManifest = serde_yaml::from_str(&written).unwrap();
        assert!(manifest.validate().is_ok());

        assert!(validate(Some(path)).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate(Some(dir.path().join("absent.yaml"))).is_err());
    }
}
