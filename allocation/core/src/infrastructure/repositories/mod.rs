// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresUserRepository** - Accounts and password digests
//! - **PostgresProjectRepository** - Project catalog
//! - **PostgresApplicationRepository** - Application ledger with versioned writes
//! - **PostgresCoGuideRepository** - Co-guide delegations
//! - **PostgresSubmissionRepository** - Reports and marks
//!
//! ## In-Memory Repositories
//!
//! HashMap-backed implementations for development and tests. Every
//! check-then-write (uniqueness, version comparison) runs under a single
//! write lock, which gives the same atomicity the PostgreSQL versions get
//! from constraints and transactions.

pub mod postgres_application;
pub mod postgres_co_guide;
pub mod postgres_project;
pub mod postgres_submission;
pub mod postgres_user;

pub use postgres_application::PostgresApplicationRepository;
pub use postgres_co_guide::PostgresCoGuideRepository;
pub use postgres_project::PostgresProjectRepository;
pub use postgres_submission::PostgresSubmissionRepository;
pub use postgres_user::PostgresUserRepository;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::co_guide::CoGuideDelegation;
use crate::domain::context::{OneTimeCode, OneTimeCodePurpose, Session, SessionToken};
use crate::domain::ledger::{Application, ApplicationId, ApplicationStatus};
use crate::domain::project::{Project, ProjectId};
use crate::domain::repository::{
    ApplicationRepository, CoGuideRepository, OneTimeCodeRepository, ProjectRepository, RepositoryError,
    SessionRepository, SubmissionRepository, UserRepository,
};
use crate::domain::submission::Submission;
use crate::domain::user::{Role, User, UserId};

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write();
        if users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict(format!("user id {} is taken", user.id)));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict(format!("email {} is taken", user.email)));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn save(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write();
        match users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().values().find(|u| u.email == email).cloned())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self
            .users
            .read()
            .values()
            .filter(|u| u.role() == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}

#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<SessionToken, Session>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        self.sessions.write().insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find(&self, token: &SessionToken) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.read().get(token).cloned())
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), RepositoryError> {
        self.sessions.write().remove(token);
        Ok(())
    }

    async fn delete_for_user(&self, user: &UserId) -> Result<(), RepositoryError> {
        self.sessions.write().retain(|_, s| &s.principal.user_id != user);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOneTimeCodeRepository {
    codes: Arc<RwLock<HashMap<(OneTimeCodePurpose, String), OneTimeCode>>>,
}

impl InMemoryOneTimeCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OneTimeCodeRepository for InMemoryOneTimeCodeRepository {
    async fn save(&self, code: &OneTimeCode) -> Result<(), RepositoryError> {
        self.codes
            .write()
            .insert((code.purpose, code.email.clone()), code.clone());
        Ok(())
    }

    async fn find(&self, purpose: OneTimeCodePurpose, email: &str) -> Result<Option<OneTimeCode>, RepositoryError> {
        Ok(self.codes.read().get(&(purpose, email.to_string())).cloned())
    }

    async fn delete(&self, purpose: OneTimeCodePurpose, email: &str) -> Result<(), RepositoryError> {
        self.codes.write().remove(&(purpose, email.to_string()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProjectRepository {
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn oldest_first(projects: &mut [Project]) {
    projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn insert(&self, project: &Project) -> Result<(), RepositoryError> {
        let mut projects = self.projects.write();
        let duplicate = projects
            .values()
            .any(|p| p.owner == project.owner && p.name == project.name);
        if duplicate || projects.contains_key(&project.id) {
            return Err(RepositoryError::Conflict(format!(
                "{} already has a project named {:?}",
                project.owner, project.name
            )));
        }
        projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn save(&self, project: &Project) -> Result<(), RepositoryError> {
        let mut projects = self.projects.write();
        match projects.get_mut(&project.id) {
            Some(stored) => {
                *stored = project.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("project {}", project.id))),
        }
    }

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, RepositoryError> {
        Ok(self.projects.read().get(&id).cloned())
    }

    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Project>, RepositoryError> {
        let mut projects: Vec<Project> = self
            .projects
            .read()
            .values()
            .filter(|p| &p.owner == owner)
            .cloned()
            .collect();
        oldest_first(&mut projects);
        Ok(projects)
    }

    async fn list_all(&self) -> Result<Vec<Project>, RepositoryError> {
        let mut projects: Vec<Project> = self.projects.read().values().cloned().collect();
        oldest_first(&mut projects);
        Ok(projects)
    }

    async fn delete(&self, id: ProjectId) -> Result<(), RepositoryError> {
        self.projects.write().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryApplicationRepository {
    applications: Arc<RwLock<HashMap<ApplicationId, Application>>>,
}

impl InMemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, predicate: F) -> Vec<Application>
    where
        F: Fn(&Application) -> bool,
    {
        let mut found: Vec<Application> = self
            .applications
            .read()
            .values()
            .filter(|a| predicate(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        found
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError> {
        let mut applications = self.applications.write();
        let open_duplicate = applications.values().any(|a| {
            a.student_id == application.student_id
                && a.project_id == application.project_id
                && a.status() != ApplicationStatus::Rejected
        });
        if open_duplicate || applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict(format!(
                "{} already holds an application for project {}",
                application.student_id, application.project_id
            )));
        }
        applications.insert(application.id, application.clone());
        Ok(())
    }

    async fn update_many(&self, batch: &[Application]) -> Result<(), RepositoryError> {
        let mut applications = self.applications.write();
        for application in batch {
            match applications.get(&application.id) {
                Some(stored) if stored.version == application.version => {}
                Some(stored) => {
                    return Err(RepositoryError::Conflict(format!(
                        "application {} is at version {}, expected {}",
                        application.id, stored.version, application.version
                    )));
                }
                None => {
                    return Err(RepositoryError::Conflict(format!(
                        "application {} no longer exists",
                        application.id
                    )));
                }
            }
        }
        for application in batch {
            let mut next = application.clone();
            next.version += 1;
            applications.insert(next.id, next);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.applications.read().get(&id).cloned())
    }

    async fn find_by_student(&self, student: &UserId) -> Result<Vec<Application>, RepositoryError> {
        Ok(self.collect(|a| &a.student_id == student))
    }

    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Application>, RepositoryError> {
        Ok(self.collect(|a| a.project_id == project))
    }

    async fn find_by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>, RepositoryError> {
        Ok(self.collect(|a| a.status() == status))
    }

    async fn delete(&self, id: ApplicationId, expected_version: u64) -> Result<(), RepositoryError> {
        let mut applications = self.applications.write();
        match applications.get(&id) {
            Some(stored) if stored.version == expected_version => {
                applications.remove(&id);
                Ok(())
            }
            Some(_) => Err(RepositoryError::Conflict(format!("application {} changed", id))),
            None => Err(RepositoryError::NotFound(format!("application {}", id))),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCoGuideRepository {
    delegations: Arc<RwLock<HashMap<ApplicationId, CoGuideDelegation>>>,
}

impl InMemoryCoGuideRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoGuideRepository for InMemoryCoGuideRepository {
    async fn save(&self, delegation: &CoGuideDelegation) -> Result<(), RepositoryError> {
        self.delegations
            .write()
            .insert(delegation.application_id, delegation.clone());
        Ok(())
    }

    async fn find_by_application(&self, id: ApplicationId) -> Result<Option<CoGuideDelegation>, RepositoryError> {
        Ok(self.delegations.read().get(&id).cloned())
    }

    async fn find_for_invitee(&self, user: &UserId) -> Result<Vec<CoGuideDelegation>, RepositoryError> {
        let mut found: Vec<CoGuideDelegation> = self
            .delegations
            .read()
            .values()
            .filter(|d| d.is_invited(user))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.delegated_at.cmp(&b.delegated_at));
        Ok(found)
    }

    async fn delete(&self, id: ApplicationId) -> Result<bool, RepositoryError> {
        Ok(self.delegations.write().remove(&id).is_some())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySubmissionRepository {
    submissions: Arc<RwLock<HashMap<(ProjectId, UserId), Submission>>>,
}

impl InMemorySubmissionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionRepository for InMemorySubmissionRepository {
    async fn save(&self, submission: &Submission) -> Result<(), RepositoryError> {
        self.submissions.write().insert(
            (submission.project_id, submission.roll_number.clone()),
            submission.clone(),
        );
        Ok(())
    }

    async fn find(&self, project: ProjectId, roll_number: &UserId) -> Result<Option<Submission>, RepositoryError> {
        Ok(self
            .submissions
            .read()
            .get(&(project, roll_number.clone()))
            .cloned())
    }

    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Submission>, RepositoryError> {
        let mut found: Vec<Submission> = self
            .submissions
            .read()
            .values()
            .filter(|s| s.project_id == project)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.roll_number.cmp(&b.roll_number));
        Ok(found)
    }
}
