// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Co-Guide Delegation
//!
//! The owning faculty can ask other faculty to review an application. The
//! delegation only points at its application by id; the application never
//! points back and finds its delegation through the repository.
//!
//! ## Selection
//!
//! The persisted invitee list is either explicit faculty ids or the single
//! sentinel `"any"`, which opens the review to every faculty member except
//! the owner. The sentinel is kept as-is and returned verbatim to viewers.
//!
//! ## Resolution
//!
//! [`CoGuidePolicy`] decides when recorded approvals are enough to approve
//! the application. Rejections are only recorded; they never reject the
//! application on their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::domain::ledger::{ApplicationId, StatusAction};
use crate::domain::user::UserId;

/// Persisted sentinel meaning "open to any faculty".
pub const ANY_FACULTY: &str = "any";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub enum CoGuideSelection {
    Any,
    Faculty(BTreeSet<UserId>),
}

impl CoGuideSelection {
    /// Build from raw form values. `"any"` must stand alone; mixing it with
    /// faculty ids is refused so nothing written is silently dropped.
    pub fn from_values<I, S>(values: I) -> Result<Self, SelectionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut any = false;
        let mut ids = BTreeSet::new();
        for value in values {
            let value = value.as_ref().trim();
            if value == ANY_FACULTY {
                any = true;
            } else if !value.is_empty() {
                ids.insert(UserId::new(value));
            }
        }
        match (any, ids.is_empty()) {
            (true, true) => Ok(CoGuideSelection::Any),
            (true, false) => Err(SelectionError::MixedAny(
                ids.iter().map(|id| id.0.as_str()).collect::<Vec<_>>().join(", "),
            )),
            (false, _) => Ok(CoGuideSelection::Faculty(ids)),
        }
    }

    /// The list exactly as stored.
    pub fn to_values(&self) -> Vec<String> {
        match self {
            CoGuideSelection::Any => vec![ANY_FACULTY.to_string()],
            CoGuideSelection::Faculty(ids) => ids.iter().map(|id| id.0.clone()).collect(),
        }
    }

    pub fn contains(&self, user: &UserId) -> bool {
        match self {
            CoGuideSelection::Any => true,
            CoGuideSelection::Faculty(ids) => ids.contains(user),
        }
    }
}

impl TryFrom<Vec<String>> for CoGuideSelection {
    type Error = SelectionError;

    fn try_from(values: Vec<String>) -> Result<Self, Self::Error> {
        CoGuideSelection::from_values(values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// Carries the named ids, comma separated.
    #[error("\"any\" cannot be combined with named co-guides ({0})")]
    MixedAny(String),
}

impl From<CoGuideSelection> for Vec<String> {
    fn from(selection: CoGuideSelection) -> Self {
        selection.to_values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "Pending",
            ReviewStatus::Approved => "Approved",
            ReviewStatus::Rejected => "Rejected",
        }
    }
}

impl From<StatusAction> for ReviewStatus {
    fn from(action: StatusAction) -> Self {
        match action {
            StatusAction::Approve => ReviewStatus::Approved,
            StatusAction::Reject => ReviewStatus::Rejected,
        }
    }
}

/// How many co-guide approvals it takes to approve the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoGuidePolicy {
    #[default]
    AnyApprove,
    AllMustApprove,
}

impl CoGuidePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "any_approve" => Some(CoGuidePolicy::AnyApprove),
            "all_must_approve" => Some(CoGuidePolicy::AllMustApprove),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{user} was not invited to review application {application_id}")]
pub struct NotInvitedError {
    pub application_id: ApplicationId,
    pub user: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoGuideDelegation {
    pub application_id: ApplicationId,
    pub delegated_by: UserId,
    pub selection: CoGuideSelection,
    pub reviews: BTreeMap<UserId, ReviewStatus>,
    pub delegated_at: DateTime<Utc>,
}

impl CoGuideDelegation {
    pub fn new(application_id: ApplicationId, delegated_by: UserId, selection: CoGuideSelection) -> Self {
        let reviews = match &selection {
            CoGuideSelection::Any => BTreeMap::new(),
            CoGuideSelection::Faculty(ids) => ids
                .iter()
                .map(|id| (id.clone(), ReviewStatus::Pending))
                .collect(),
        };
        Self {
            application_id,
            delegated_by,
            selection,
            reviews,
            delegated_at: Utc::now(),
        }
    }

    /// Whether `user` may act as a co-guide on this application.
    pub fn is_invited(&self, user: &UserId) -> bool {
        user != &self.delegated_by && self.selection.contains(user)
    }

    pub fn review_of(&self, user: &UserId) -> ReviewStatus {
        self.reviews.get(user).copied().unwrap_or(ReviewStatus::Pending)
    }

    pub fn record(&mut self, user: &UserId, decision: StatusAction) -> Result<(), NotInvitedError> {
        if !self.is_invited(user) {
            return Err(NotInvitedError {
                application_id: self.application_id,
                user: user.clone(),
            });
        }
        self.reviews.insert(user.clone(), decision.into());
        Ok(())
    }

    /// Whether the recorded reviews approve the application under `policy`.
    pub fn approves(&self, policy: CoGuidePolicy) -> bool {
        let approved = |id: &UserId| self.review_of(id) == ReviewStatus::Approved;
        match (policy, &self.selection) {
            (CoGuidePolicy::AnyApprove, _) | (CoGuidePolicy::AllMustApprove, CoGuideSelection::Any) => {
                self.reviews.values().any(|r| *r == ReviewStatus::Approved)
            }
            (CoGuidePolicy::AllMustApprove, CoGuideSelection::Faculty(ids)) => {
                !ids.is_empty() && ids.iter().all(approved)
            }
        }
    }
}
