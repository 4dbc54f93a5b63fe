// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::files::FileRef;
use crate::domain::project::{Project, ProjectId, SubmissionDetails};
use crate::domain::repository::{ProjectRepository, RepositoryError};
use crate::domain::user::UserId;

pub struct PostgresProjectRepository {
    pool: PgPool,
}

impl PostgresProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_project(row: &PgRow) -> Result<Project, RepositoryError> {
        let id: Uuid = row.try_get("id")?;
        let file: Option<String> = row.try_get("file_ref")?;
        let deadline: Option<DateTime<Utc>> = row.try_get("deadline")?;
        let full_marks: Option<i32> = row.try_get("full_marks")?;
        let students: serde_json::Value = row.try_get("students")?;
        let students: Vec<UserId> = serde_json::from_value(students)?;

        Ok(Project {
            id: ProjectId(id),
            name: row.try_get("name")?,
            owner: UserId(row.try_get("owner_id")?),
            file: file.map(FileRef),
            submission: SubmissionDetails {
                deadline,
                full_marks: full_marks.map(|m| m as u32),
            },
            students,
            created_at: row.try_get("created_at")?,
        })
    }
}

const PROJECT_COLUMNS: &str = "id, name, owner_id, file_ref, deadline, full_marks, students, created_at";

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn insert(&self, project: &Project) -> Result<(), RepositoryError> {
        let students = serde_json::to_value(&project.students)?;
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, owner_id, file_ref, deadline, full_marks, students, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(project.id.0)
        .bind(&project.name)
        .bind(project.owner.as_str())
        .bind(project.file.as_ref().map(|f| f.0.as_str()))
        .bind(project.submission.deadline)
        .bind(project.submission.full_marks.map(|m| m as i32))
        .bind(&students)
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, project: &Project) -> Result<(), RepositoryError> {
        let students = serde_json::to_value(&project.students)?;
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET name = $2, file_ref = $3, deadline = $4, full_marks = $5, students = $6
            WHERE id = $1
            "#,
        )
        .bind(project.id.0)
        .bind(&project.name)
        .bind(project.file.as_ref().map(|f| f.0.as_str()))
        .bind(project.submission.deadline)
        .bind(project.submission.full_marks.map(|m| m as i32))
        .bind(&students)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("project {}", project.id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_project).transpose()
    }

    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Project>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_project).collect()
    }

    async fn list_all(&self) -> Result<Vec<Project>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_project).collect()
    }

    async fn delete(&self, id: ProjectId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
