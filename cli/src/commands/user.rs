// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Account administration
//!
//! Admin accounts cannot sign up through the web; they are created here.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use btp_allocation_core::context::RequestContext;
use btp_allocation_core::user::{NewUser, Role, UserId};

use crate::runtime::build_services;

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create an account without email verification
    Create {
        /// Roll number or staff id
        #[arg(long)]
        id: String,

        /// student, faculty or admin
        #[arg(long, default_value = "admin")]
        role: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long, default_value = "")]
        department: String,

        /// Initial password
        #[arg(long, env = "BTP_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// List accounts
    List {
        /// Only accounts with this role
        #[arg(long)]
        role: Option<String>,
    },
}

pub async fn handle_command(command: UserCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = crate::load_config(config_path).context("Failed to load configuration")?;
    let services = build_services(&config).await?;
    let system = RequestContext::system();

    match command {
        UserCommand::Create {
            id,
            role,
            name,
            email,
            department,
            password,
        } => {
            let role = parse_role(&role)?;
            let profile = services
                .identity
                .provision_user(
                    &system,
                    NewUser {
                        id: UserId::new(id),
                        role,
                        full_name: name,
                        email,
                        department,
                        password,
                    },
                )
                .await
                .context("Failed to create user")?;
            println!(
                "{}",
                format!("✓ Created {} account {} <{}>", profile.role, profile.id, profile.email).green()
            );
        }
        UserCommand::List { role } => {
            let role = role.as_deref().map(parse_role).transpose()?;
            let users = services.identity.list_users(&system, role).await?;
            if users.is_empty() {
                println!("{}", "No accounts".dimmed());
            }
            for user in users {
                println!("{:<12} {:<8} {} <{}>", user.id.as_str(), user.role.as_str(), user.full_name, user.email);
            }
        }
    }
    Ok(())
}

fn parse_role(value: &str) -> Result<Role> {
    match Role::parse(value) {
        Some(role) => Ok(role),
        None => bail!("Unknown role '{}'. Expected student, faculty or admin", value),
    }
}
