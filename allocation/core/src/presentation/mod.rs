// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface that resolves the caller once per request and translates
//! requests into application service calls. No allocation rules live here;
//! all real work is delegated to `crate::application`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | JSON endpoints, session cookie or bearer token |

pub mod api;
