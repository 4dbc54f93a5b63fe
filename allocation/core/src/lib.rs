// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # BTP Allocation Core
//!
//! Matching of final-year students to faculty-posted projects: project
//! catalog, application ledger, co-guide delegation, confirmation and
//! grading.
//!
//! # Architecture
//!
//! - **domain:** aggregates, capability table, repository traits, config
//! - **application:** one service per component, all authorization here
//! - **infrastructure:** repositories, event bus, mail, file storage
//! - **presentation:** axum HTTP surface

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
