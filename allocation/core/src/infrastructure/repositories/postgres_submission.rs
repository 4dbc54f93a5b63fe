// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::files::FileRef;
use crate::domain::project::ProjectId;
use crate::domain::repository::{RepositoryError, SubmissionRepository};
use crate::domain::submission::Submission;
use crate::domain::user::UserId;

pub struct PostgresSubmissionRepository {
    pool: PgPool,
}

impl PostgresSubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_submission(row: &PgRow) -> Result<Submission, RepositoryError> {
        let project_id: Uuid = row.try_get("project_id")?;
        let mark: Option<i32> = row.try_get("mark")?;
        Ok(Submission {
            project_id: ProjectId(project_id),
            roll_number: UserId(row.try_get("roll_number")?),
            file: FileRef(row.try_get("file_ref")?),
            mark: mark.map(|m| m as u32),
            submitted_at: row.try_get("submitted_at")?,
            graded_at: row.try_get("graded_at")?,
        })
    }
}

#[async_trait]
impl SubmissionRepository for PostgresSubmissionRepository {
    async fn save(&self, submission: &Submission) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO submissions (project_id, roll_number, file_ref, mark, submitted_at, graded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (project_id, roll_number) DO UPDATE SET
                file_ref = EXCLUDED.file_ref,
                mark = EXCLUDED.mark,
                submitted_at = EXCLUDED.submitted_at,
                graded_at = EXCLUDED.graded_at
            "#,
        )
        .bind(submission.project_id.0)
        .bind(submission.roll_number.as_str())
        .bind(submission.file.0.as_str())
        .bind(submission.mark.map(|m| m as i32))
        .bind(submission.submitted_at)
        .bind(submission.graded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, project: ProjectId, roll_number: &UserId) -> Result<Option<Submission>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT project_id, roll_number, file_ref, mark, submitted_at, graded_at
            FROM submissions
            WHERE project_id = $1 AND roll_number = $2
            "#,
        )
        .bind(project.0)
        .bind(roll_number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_submission).transpose()
    }

    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Submission>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, roll_number, file_ref, mark, submitted_at, graded_at
            FROM submissions
            WHERE project_id = $1
            ORDER BY roll_number ASC
            "#,
        )
        .bind(project.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_submission).collect()
    }
}
