// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Aggregates and value objects for users, projects, applications,
//! co-guide delegations and submissions, plus the contracts the
//! infrastructure layer implements.

pub mod user;
pub mod context;
pub mod project;
pub mod ledger;
pub mod co_guide;
pub mod submission;
pub mod files;
pub mod notification;
pub mod events;
pub mod error;
pub mod capability;
pub mod repository;
pub mod config;
