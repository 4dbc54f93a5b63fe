// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! BTP allocation CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** wires configuration into the core services and runs them

pub mod commands;
pub mod runtime;

use anyhow::Result;
use std::path::PathBuf;

use btp_allocation_core::config::AllocationConfigManifest;

/// Load the manifest from `path` or discovery, with env overrides applied.
pub fn load_config(path: Option<PathBuf>) -> Result<AllocationConfigManifest> {
    AllocationConfigManifest::load_or_default(path)
}
