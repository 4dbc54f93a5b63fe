// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the BTP CLI

pub mod config;
pub mod finalize;
pub mod serve;
pub mod user;

pub use self::config::ConfigCommand;
pub use self::serve::ServeArgs;
pub use self::user::UserCommand;
