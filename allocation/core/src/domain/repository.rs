// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root: one repository per
//! aggregate, interface defined here, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `UserRepository` | `User` | `InMemoryUserRepository`, `PostgresUserRepository` |
//! | `SessionRepository` | `Session` | `InMemorySessionRepository` |
//! | `OneTimeCodeRepository` | `OneTimeCode` | `InMemoryOneTimeCodeRepository` |
//! | `ProjectRepository` | `Project` | `InMemoryProjectRepository`, `PostgresProjectRepository` |
//! | `ApplicationRepository` | `Application` | `InMemoryApplicationRepository`, `PostgresApplicationRepository` |
//! | `CoGuideRepository` | `CoGuideDelegation` | `InMemoryCoGuideRepository`, `PostgresCoGuideRepository` |
//! | `SubmissionRepository` | `Submission` | `InMemorySubmissionRepository`, `PostgresSubmissionRepository` |
//!
//! ## Optimistic Concurrency
//!
//! `ApplicationRepository::update_many` is the only way to change a stored
//! application. It compares every row's stored `version` with the version the
//! caller read and writes all rows, bumping each version, or none of them.
//! A mismatch is reported as [`RepositoryError::Conflict`].

use async_trait::async_trait;

use crate::domain::co_guide::CoGuideDelegation;
use crate::domain::context::{OneTimeCode, OneTimeCodePurpose, Session, SessionToken};
use crate::domain::ledger::{Application, ApplicationId, ApplicationStatus};
use crate::domain::project::{Project, ProjectId};
use crate::domain::submission::Submission;
use crate::domain::user::{Role, User, UserId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Fails with `Conflict` if the id or email is taken.
    async fn insert(&self, user: &User) -> Result<(), RepositoryError>;

    /// Update an existing user.
    async fn save(&self, user: &User) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn list_by_role(&self, role: Role) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save(&self, session: &Session) -> Result<(), RepositoryError>;

    async fn find(&self, token: &SessionToken) -> Result<Option<Session>, RepositoryError>;

    async fn delete(&self, token: &SessionToken) -> Result<(), RepositoryError>;

    /// Revoke every session of a user (password reset).
    async fn delete_for_user(&self, user: &UserId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OneTimeCodeRepository: Send + Sync {
    /// Store a code, replacing any earlier code for the same purpose and email.
    async fn save(&self, code: &OneTimeCode) -> Result<(), RepositoryError>;

    async fn find(&self, purpose: OneTimeCodePurpose, email: &str) -> Result<Option<OneTimeCode>, RepositoryError>;

    async fn delete(&self, purpose: OneTimeCodePurpose, email: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Insert a new project. Fails with `Conflict` if the owner already has a
    /// project with exactly this name.
    async fn insert(&self, project: &Project) -> Result<(), RepositoryError>;

    /// Update an existing project.
    async fn save(&self, project: &Project) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, RepositoryError>;

    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Project>, RepositoryError>;

    /// All projects, oldest first.
    async fn list_all(&self) -> Result<Vec<Project>, RepositoryError>;

    async fn delete(&self, id: ProjectId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Insert a new application. Fails with `Conflict` if the student already
    /// holds a non-rejected application for the same project.
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError>;

    /// Atomically write every application whose stored version still equals
    /// `application.version`, bumping each version by one. Writes nothing and
    /// fails with `Conflict` if any row changed or vanished since it was read.
    async fn update_many(&self, applications: &[Application]) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;

    /// All applications of a student, oldest first.
    async fn find_by_student(&self, student: &UserId) -> Result<Vec<Application>, RepositoryError>;

    /// All applications for a project, oldest first.
    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Application>, RepositoryError>;

    async fn find_by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>, RepositoryError>;

    /// Delete if the stored version still equals `expected_version`.
    async fn delete(&self, id: ApplicationId, expected_version: u64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CoGuideRepository: Send + Sync {
    /// Store a delegation, replacing any earlier one for the same application.
    async fn save(&self, delegation: &CoGuideDelegation) -> Result<(), RepositoryError>;

    async fn find_by_application(&self, id: ApplicationId) -> Result<Option<CoGuideDelegation>, RepositoryError>;

    /// Delegations naming `user`, or open to any faculty.
    async fn find_for_invitee(&self, user: &UserId) -> Result<Vec<CoGuideDelegation>, RepositoryError>;

    /// Returns whether a delegation existed.
    async fn delete(&self, id: ApplicationId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Insert or replace the submission for (project, roll number).
    async fn save(&self, submission: &Submission) -> Result<(), RepositoryError>;

    async fn find(&self, project: ProjectId, roll_number: &UserId) -> Result<Option<Submission>, RepositoryError>;

    /// Submissions of a project ordered by roll number.
    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Submission>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
