// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Table
//!
//! Every protected operation has exactly one [`CapabilityRule`]: the roles
//! that may call it, the ownership predicate the caller must satisfy, and
//! which error a denied caller receives.
//!
//! ## Evaluation
//!
//! Authorization happens in two steps against the same rule:
//!
//! 1. [`Operation::admit`]: the request must be authenticated and the role
//!    must be listed. Nothing is read from storage before this passes.
//! 2. [`Admitted::check`]: once the service has loaded the facts the
//!    predicate needs, the ownership predicate is evaluated.
//!
//! Anonymous callers always get `Unauthenticated`.

use crate::domain::co_guide::CoGuideDelegation;
use crate::domain::context::{Principal, RequestContext};
use crate::domain::error::AllocationError;
use crate::domain::user::{Role, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ViewProfile,
    FacultyDirectory,
    CreateProject,
    DeleteProject,
    ListProjects,
    ViewOwnProjects,
    Apply,
    SetStatus,
    Confirm,
    FinalizeConfirmations,
    DeleteApplication,
    ListApplications,
    ListOwnApplications,
    Delegate,
    RespondCoGuide,
    ViewSelectedCoGuides,
    CoGuideInbox,
    SetSubmissionDetails,
    SubmitReport,
    RecordMarks,
    ListSubmissions,
    ViewMarks,
    ProvisionUser,
    ViewUsers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    None,
    ProjectOwner,
    ProjectOwnerOrAdmin,
    Applicant,
    ProjectOwnerOrCoGuide,
    OwnRollNumber,
    /// Students see their own roll number, faculty their own projects.
    OwnRollOrProjectOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthorized,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRule {
    pub roles: &'static [Role],
    pub ownership: Ownership,
    pub denial: Denial,
}

const ANYONE: &[Role] = &[Role::Student, Role::Faculty, Role::Admin];
const STUDENT: &[Role] = &[Role::Student];
const FACULTY: &[Role] = &[Role::Faculty];
const ADMIN: &[Role] = &[Role::Admin];
const FACULTY_OR_ADMIN: &[Role] = &[Role::Faculty, Role::Admin];
const STUDENT_OR_FACULTY: &[Role] = &[Role::Student, Role::Faculty];

const fn rule(roles: &'static [Role], ownership: Ownership, denial: Denial) -> CapabilityRule {
    CapabilityRule { roles, ownership, denial }
}

impl Operation {
    pub fn rule(&self) -> CapabilityRule {
        use Denial::*;
        use Operation::*;
        match self {
            ViewProfile => rule(ANYONE, Ownership::None, Unauthorized),
            FacultyDirectory => rule(ANYONE, Ownership::None, Unauthorized),
            CreateProject => rule(FACULTY, Ownership::None, Unauthorized),
            DeleteProject => rule(FACULTY_OR_ADMIN, Ownership::ProjectOwnerOrAdmin, Unauthorized),
            ListProjects => rule(ANYONE, Ownership::None, Unauthorized),
            ViewOwnProjects => rule(FACULTY, Ownership::None, Unauthorized),
            Apply => rule(STUDENT, Ownership::None, Unauthorized),
            SetStatus => rule(FACULTY, Ownership::ProjectOwnerOrCoGuide, Unauthorized),
            Confirm => rule(STUDENT, Ownership::None, Unauthorized),
            FinalizeConfirmations => rule(ADMIN, Ownership::None, Unauthorized),
            DeleteApplication => rule(STUDENT, Ownership::Applicant, Unauthorized),
            ListApplications => rule(FACULTY, Ownership::None, Unauthorized),
            ListOwnApplications => rule(STUDENT, Ownership::None, Unauthorized),
            Delegate => rule(FACULTY, Ownership::ProjectOwner, Unauthorized),
            RespondCoGuide => rule(FACULTY, Ownership::None, Unauthorized),
            ViewSelectedCoGuides => rule(ANYONE, Ownership::None, Unauthorized),
            CoGuideInbox => rule(FACULTY, Ownership::None, Unauthorized),
            SetSubmissionDetails => rule(FACULTY, Ownership::ProjectOwner, Forbidden),
            SubmitReport => rule(STUDENT, Ownership::OwnRollNumber, Unauthorized),
            RecordMarks => rule(FACULTY, Ownership::ProjectOwner, Forbidden),
            ListSubmissions => rule(FACULTY, Ownership::ProjectOwner, Forbidden),
            ViewMarks => rule(STUDENT_OR_FACULTY, Ownership::OwnRollOrProjectOwner, Unauthorized),
            ProvisionUser => rule(ADMIN, Ownership::None, Unauthorized),
            ViewUsers => rule(ADMIN, Ownership::None, Unauthorized),
        }
    }

    /// First step: authentication and role.
    pub fn admit<'c>(self, ctx: &'c RequestContext) -> Result<Admitted<'c>, AllocationError> {
        let principal = ctx.principal()?;
        let rule = self.rule();
        if !rule.roles.contains(&principal.role) {
            tracing::warn!(
                operation = ?self,
                user = %principal.user_id,
                role = %principal.role,
                "Role not permitted"
            );
            return Err(deny(self, rule.denial));
        }
        Ok(Admitted { operation: self, rule, principal })
    }
}

/// Facts an ownership predicate is evaluated against.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnershipFacts<'a> {
    pub project_owner: Option<&'a UserId>,
    pub applicant: Option<&'a UserId>,
    pub delegation: Option<&'a CoGuideDelegation>,
    pub roll_number: Option<&'a UserId>,
}

impl<'a> OwnershipFacts<'a> {
    pub fn project(owner: &'a UserId) -> Self {
        Self { project_owner: Some(owner), ..Default::default() }
    }
}

/// A caller that passed [`Operation::admit`].
#[derive(Debug, Clone, Copy)]
pub struct Admitted<'c> {
    pub operation: Operation,
    pub rule: CapabilityRule,
    pub principal: &'c Principal,
}

impl<'c> Admitted<'c> {
    pub fn user_id(&self) -> &'c UserId {
        &self.principal.user_id
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }

    /// Second step: the ownership predicate.
    pub fn check(&self, facts: &OwnershipFacts<'_>) -> Result<(), AllocationError> {
        if self.satisfies(facts) {
            return Ok(());
        }
        tracing::warn!(
            operation = ?self.operation,
            user = %self.principal.user_id,
            "Ownership check failed"
        );
        Err(deny(self.operation, self.rule.denial))
    }

    fn satisfies(&self, facts: &OwnershipFacts<'_>) -> bool {
        let me = &self.principal.user_id;
        let is = |who: Option<&UserId>| who == Some(me);
        match self.rule.ownership {
            Ownership::None => true,
            Ownership::ProjectOwner => is(facts.project_owner),
            Ownership::ProjectOwnerOrAdmin => {
                self.principal.role == Role::Admin || is(facts.project_owner)
            }
            Ownership::Applicant => is(facts.applicant),
            Ownership::ProjectOwnerOrCoGuide => {
                is(facts.project_owner) || facts.delegation.is_some_and(|d| d.is_invited(me))
            }
            Ownership::OwnRollNumber => is(facts.roll_number),
            Ownership::OwnRollOrProjectOwner => match self.principal.role {
                Role::Student => is(facts.roll_number),
                Role::Faculty => is(facts.project_owner),
                Role::Admin => false,
            },
        }
    }
}

fn deny(operation: Operation, denial: Denial) -> AllocationError {
    match denial {
        Denial::Unauthorized => AllocationError::Unauthorized,
        Denial::Forbidden => AllocationError::Forbidden(format!("{:?} is limited to the owning faculty", operation)),
    }
}
