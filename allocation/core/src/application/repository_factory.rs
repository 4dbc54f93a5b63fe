// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Picks concrete repository implementations for the configured storage
//! backend. Sessions and one-time codes are short-lived and always kept in
//! memory; every other aggregate follows the backend.

use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::repository::{
    ApplicationRepository, CoGuideRepository, OneTimeCodeRepository, ProjectRepository, SessionRepository,
    StorageBackend, SubmissionRepository, UserRepository,
};
use crate::infrastructure::repositories::{
    InMemoryApplicationRepository, InMemoryCoGuideRepository, InMemoryOneTimeCodeRepository,
    InMemoryProjectRepository, InMemorySessionRepository, InMemorySubmissionRepository, InMemoryUserRepository,
    PostgresApplicationRepository, PostgresCoGuideRepository, PostgresProjectRepository,
    PostgresSubmissionRepository, PostgresUserRepository,
};

/// Creates a UserRepository implementation based on the configured backend
pub fn create_user_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn UserRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresUserRepository::new(pool)),
        _ => Arc::new(InMemoryUserRepository::new()),
    }
}

pub fn create_project_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn ProjectRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresProjectRepository::new(pool)),
        _ => Arc::new(InMemoryProjectRepository::new()),
    }
}

pub fn create_application_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Arc<dyn ApplicationRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresApplicationRepository::new(pool)),
        _ => Arc::new(InMemoryApplicationRepository::new()),
    }
}

pub fn create_co_guide_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn CoGuideRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresCoGuideRepository::new(pool)),
        _ => Arc::new(InMemoryCoGuideRepository::new()),
    }
}

pub fn create_submission_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Arc<dyn SubmissionRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresSubmissionRepository::new(pool)),
        _ => Arc::new(InMemorySubmissionRepository::new()),
    }
}

/// Every repository the services need, built for one backend.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub codes: Arc<dyn OneTimeCodeRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub co_guides: Arc<dyn CoGuideRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
}

impl Repositories {
    /// `pool` must be `Some` for the PostgreSQL backend; without one the
    /// in-memory implementations are used.
    pub fn for_backend(backend: &StorageBackend, pool: Option<PgPool>) -> Self {
        if matches!(backend, StorageBackend::PostgreSQL(_)) && pool.is_none() {
            tracing::warn!("PostgreSQL backend configured without a pool; falling back to in-memory storage");
        }
        Self {
            users: create_user_repository(backend, pool.clone()),
            sessions: Arc::new(InMemorySessionRepository::new()),
            codes: Arc::new(InMemoryOneTimeCodeRepository::new()),
            projects: create_project_repository(backend, pool.clone()),
            applications: create_application_repository(backend, pool.clone()),
            co_guides: create_co_guide_repository(backend, pool.clone()),
            submissions: create_submission_repository(backend, pool),
        }
    }

    pub fn in_memory() -> Self {
        Self::for_backend(&StorageBackend::InMemory, None)
    }
}
