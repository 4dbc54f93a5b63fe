// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL application ledger.
//!
//! `update_many` runs one transaction of `UPDATE .. WHERE id = $1 AND
//! version = $2` statements. Any statement touching zero rows rolls the
//! whole batch back and reports a conflict.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::ledger::{Application, ApplicationId, ApplicationStatus};
use crate::domain::project::ProjectId;
use crate::domain::repository::{ApplicationRepository, RepositoryError};
use crate::domain::user::UserId;

pub struct PostgresApplicationRepository {
    pool: PgPool,
}

impl PostgresApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_application(row: &PgRow) -> Result<Application, RepositoryError> {
        let id: Uuid = row.try_get("id")?;
        let project_id: Uuid = row.try_get("project_id")?;
        let status: String = row.try_get("status")?;
        let status = ApplicationStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Serialization(format!("unknown application status {:?}", status)))?;
        let version: i64 = row.try_get("version")?;

        Ok(Application::restore(
            ApplicationId(id),
            ProjectId(project_id),
            UserId(row.try_get("student_id")?),
            status,
            version as u64,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }

    fn rows_to_applications(rows: &[PgRow]) -> Result<Vec<Application>, RepositoryError> {
        rows.iter().map(Self::row_to_application).collect()
    }
}

const APPLICATION_COLUMNS: &str = "id, project_id, student_id, status, version, created_at, updated_at";

#[async_trait]
impl ApplicationRepository for PostgresApplicationRepository {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError> {
        // uq_applications_open turns a live duplicate into a unique violation
        sqlx::query(
            r#"
            INSERT INTO applications (id, project_id, student_id, status, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(application.id.0)
        .bind(application.project_id.0)
        .bind(application.student_id.as_str())
        .bind(application.status().as_str())
        .bind(application.version as i64)
        .bind(application.created_at)
        .bind(application.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_many(&self, batch: &[Application]) -> Result<(), RepositoryError> {
        // Demotions first so the one-TC-per-student index never sees two rows.
        let mut ordered: Vec<&Application> = batch.iter().collect();
        ordered.sort_by_key(|a| a.status() == ApplicationStatus::TemporarilyConfirmed);

        let mut tx = self.pool.begin().await?;
        for application in ordered {
            let result = sqlx::query(
                r#"
                UPDATE applications
                SET status = $3, version = version + 1, updated_at = $4
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(application.id.0)
            .bind(application.version as i64)
            .bind(application.status().as_str())
            .bind(application.updated_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(RepositoryError::Conflict(format!(
                    "application {} changed since version {}",
                    application.id, application.version
                )));
            }
        }
        tx.commit().await?;

        Ok(())
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_application).transpose()
    }

    async fn find_by_student(&self, student: &UserId) -> Result<Vec<Application>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE student_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(student.as_str())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_applications(&rows)
    }

    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Application>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE project_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(project.0)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_applications(&rows)
    }

    async fn find_by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE status = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_applications(&rows)
    }

    async fn delete(&self, id: ApplicationId, expected_version: u64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1 AND version = $2")
            .bind(id.0)
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM applications WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Err(if exists {
                RepositoryError::Conflict(format!("application {} changed", id))
            } else {
                RepositoryError::NotFound(format!("application {}", id))
            });
        }
        Ok(())
    }
}
