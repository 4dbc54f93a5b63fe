// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Allocation Error Taxonomy
//!
//! Every variant except [`AllocationError::Storage`] is a recoverable,
//! user-facing outcome that the presentation layer turns into a message or a
//! redirect. `Storage` is the fatal-per-request class: its text is logged
//! but never shown to the caller.

use thiserror::Error;

use crate::domain::co_guide::{NotInvitedError, SelectionError};
use crate::domain::ledger::TransitionError;
use crate::domain::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Please log in to continue")]
    Unauthenticated,

    #[error("Unauthorized access.")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("The record was changed by another request; reload and retry")]
    Conflict,

    #[error("A project with the same name already exists. Please choose a different name.")]
    DuplicateName,

    #[error("You have already applied for this project")]
    AlreadyApplied,

    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("No confirmed project allocation for this report")]
    NotConfirmed,

    #[error("Value {value} is outside the allowed range 0..={max}")]
    OutOfRange { value: u32, max: u32 },

    #[error("No file was uploaded")]
    MissingFile,

    #[error("You were not invited to review this application")]
    NotInvited,

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl AllocationError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        AllocationError::NotFound(what.to_string())
    }

    /// Stable machine-readable code for API clients and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AllocationError::Unauthenticated => "unauthenticated",
            AllocationError::Unauthorized => "unauthorized",
            AllocationError::Forbidden(_) => "forbidden",
            AllocationError::NotFound(_) => "not_found",
            AllocationError::InvalidState(_) => "invalid_state",
            AllocationError::Conflict => "conflict",
            AllocationError::DuplicateName => "duplicate_name",
            AllocationError::AlreadyApplied => "already_applied",
            AllocationError::NotEligible(_) => "not_eligible",
            AllocationError::NotConfirmed => "not_confirmed",
            AllocationError::OutOfRange { .. } => "out_of_range",
            AllocationError::MissingFile => "missing_file",
            AllocationError::NotInvited => "not_invited",
            AllocationError::Storage(_) => "storage",
        }
    }
}

impl From<RepositoryError> for AllocationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => AllocationError::Conflict,
            RepositoryError::NotFound(what) => AllocationError::NotFound(what),
            other => AllocationError::Storage(other.to_string()),
        }
    }
}

impl From<TransitionError> for AllocationError {
    fn from(err: TransitionError) -> Self {
        AllocationError::InvalidState(err.to_string())
    }
}

impl From<SelectionError> for AllocationError {
    fn from(err: SelectionError) -> Self {
        AllocationError::InvalidState(err.to_string())
    }
}

impl From<NotInvitedError> for AllocationError {
    fn from(_: NotInvitedError) -> Self {
        AllocationError::NotInvited
    }
}
