// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-shot finalize sweep, for deployments that schedule it externally.

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::path::PathBuf;
use tokio::sync::watch;

use btp_allocation_core::application::EventAuditLog;
use btp_allocation_core::context::RequestContext;

use crate::runtime::build_services;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = crate::load_config(config_path).context("Failed to load configuration")?;
    let services = build_services(&config).await?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let audit = EventAuditLog::new(services.event_bus.clone()).start(stop_rx);

    let result = services
        .workflow
        .finalize_confirmations(&RequestContext::system(), Utc::now())
        .await;
    let _ = stop_tx.send(true);
    let recorded = audit.await.unwrap_or_default();
    let summary = result.context("Finalize sweep failed")?;

    println!(
        "{}",
        format!("✓ Finalized {} allocation(s)", summary.confirmed.len()).green()
    );
    println!("  Applications closed: {}", summary.rejected);
    println!("  Still inside the confirmation window: {}", summary.waiting);
    if !summary.orphaned.is_empty() {
        println!("  Closed (project deleted): {}", summary.orphaned.len());
    }
    println!("  Events audited: {}", recorded);
    if !summary.conflicts.is_empty() {
        println!(
            "  {} {}",
            "Skipped (changed during the sweep, retry later):".yellow(),
            summary
                .conflicts
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}
