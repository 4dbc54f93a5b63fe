// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Ledger Aggregate
//!
//! One `Application` records one attempt by a student to get a project.
//! Status moves through a fixed transition table:
//!
//! ```text
//! Pending ──approve──▶ Approved ──choose──▶ Temporarily Confirmed ──finalize──▶ Confirmed
//!    │                    │   ▲                      │
//!    └──reject──▶ Rejected ◀──┘   └──────demote───────┘
//! ```
//!
//! `Rejected` and `Confirmed` are terminal. Every mutation goes through
//! [`Application::transition`], which validates against the table; the
//! repository then writes the row only if its `version` is still the one
//! that was read (optimistic check-and-set).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::project::ProjectId;
use crate::domain::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    #[serde(rename = "Temporarily Confirmed")]
    TemporarilyConfirmed,
    Confirmed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "Pending",
            ApplicationStatus::Approved => "Approved",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::TemporarilyConfirmed => "Temporarily Confirmed",
            ApplicationStatus::Confirmed => "Confirmed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(ApplicationStatus::Pending),
            "Approved" => Some(ApplicationStatus::Approved),
            "Rejected" => Some(ApplicationStatus::Rejected),
            "Temporarily Confirmed" => Some(ApplicationStatus::TemporarilyConfirmed),
            "Confirmed" => Some(ApplicationStatus::Confirmed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Rejected | ApplicationStatus::Confirmed)
    }

    /// Whether `self -> to` is an edge of the transition table.
    pub fn can_transition_to(&self, to: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, TemporarilyConfirmed)
                | (Approved, Rejected)
                | (TemporarilyConfirmed, Confirmed)
                | (TemporarilyConfirmed, Approved)
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Faculty decision on an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusAction {
    Approve,
    Reject,
}

impl StatusAction {
    pub fn target(&self) -> ApplicationStatus {
        match self {
            StatusAction::Approve => ApplicationStatus::Approved,
            StatusAction::Reject => ApplicationStatus::Rejected,
        }
    }
}

/// Result of applying a status change to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changed from the contained value.
    Changed(ApplicationStatus),
    /// The application was already in the requested state.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move application from {from} to {to}")]
pub struct TransitionError {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub project_id: ProjectId,
    pub student_id: UserId,
    status: ApplicationStatus,
    /// Optimistic concurrency token, bumped by the repository on every write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// New applications start approved: faculty downgrade rather than opt in.
    pub fn new(student_id: UserId, project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            id: ApplicationId::new(),
            project_id,
            student_id,
            status: ApplicationStatus::Approved,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild an application from storage.
    pub fn restore(
        id: ApplicationId,
        project_id: ProjectId,
        student_id: UserId,
        status: ApplicationStatus,
        version: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            student_id,
            status,
            version,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> ApplicationStatus {
        self.status
    }

    /// Open means the application still competes for the project.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Move to `to` if the transition table allows it. Requesting the
    /// current status is a no-op.
    pub fn transition(&mut self, to: ApplicationStatus) -> Result<Transition, TransitionError> {
        if self.status == to {
            return Ok(Transition::Unchanged);
        }
        if !self.status.can_transition_to(to) {
            return Err(TransitionError { from: self.status, to });
        }
        let from = self.status;
        self.status = to;
        self.updated_at = Utc::now();
        Ok(Transition::Changed(from))
    }

    /// Faculty decision. A student's own choice (temporarily confirmed or
    /// confirmed) is never overridden here.
    pub fn decide(&mut self, action: StatusAction) -> Result<Transition, TransitionError> {
        match self.status {
            ApplicationStatus::TemporarilyConfirmed | ApplicationStatus::Confirmed => Err(TransitionError {
                from: self.status,
                to: action.target(),
            }),
            _ => self.transition(action.target()),
        }
    }

    /// Administrative withdrawal used when the project disappears. Allowed
    /// from any non-terminal state.
    pub fn withdraw(&mut self) -> Result<Transition, TransitionError> {
        match self.status {
            ApplicationStatus::Rejected => Ok(Transition::Unchanged),
            ApplicationStatus::Confirmed => Err(TransitionError {
                from: self.status,
                to: ApplicationStatus::Rejected,
            }),
            from => {
                self.status = ApplicationStatus::Rejected;
                self.updated_at = Utc::now();
                Ok(Transition::Changed(from))
            }
        }
    }

    /// Rewrite without changing anything but the timestamp, so the stored
    /// version still bumps inside an atomic batch.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
