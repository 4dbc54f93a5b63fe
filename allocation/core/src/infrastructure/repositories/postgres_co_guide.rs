// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::co_guide::{CoGuideDelegation, CoGuideSelection, ReviewStatus, ANY_FACULTY};
use crate::domain::ledger::ApplicationId;
use crate::domain::repository::{CoGuideRepository, RepositoryError};
use crate::domain::user::UserId;

pub struct PostgresCoGuideRepository {
    pool: PgPool,
}

impl PostgresCoGuideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_delegation(row: &PgRow) -> Result<CoGuideDelegation, RepositoryError> {
        let application_id: Uuid = row.try_get("application_id")?;
        let co_guides: serde_json::Value = row.try_get("co_guides")?;
        let co_guides: Vec<String> = serde_json::from_value(co_guides)?;
        let reviews: serde_json::Value = row.try_get("reviews")?;
        let reviews: BTreeMap<UserId, ReviewStatus> = serde_json::from_value(reviews)?;

        Ok(CoGuideDelegation {
            application_id: ApplicationId(application_id),
            delegated_by: UserId(row.try_get("delegated_by")?),
            selection: CoGuideSelection::from_values(co_guides)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            reviews,
            delegated_at: row.try_get("delegated_at")?,
        })
    }
}

#[async_trait]
impl CoGuideRepository for PostgresCoGuideRepository {
    async fn save(&self, delegation: &CoGuideDelegation) -> Result<(), RepositoryError> {
        let co_guides = serde_json::to_value(delegation.selection.to_values())?;
        let reviews = serde_json::to_value(&delegation.reviews)?;

        sqlx::query(
            r#"
            INSERT INTO co_guide_delegations (application_id, delegated_by, co_guides, reviews, delegated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (application_id) DO UPDATE SET
                delegated_by = EXCLUDED.delegated_by,
                co_guides = EXCLUDED.co_guides,
                reviews = EXCLUDED.reviews,
                delegated_at = EXCLUDED.delegated_at
            "#,
        )
        .bind(delegation.application_id.0)
        .bind(delegation.delegated_by.as_str())
        .bind(&co_guides)
        .bind(&reviews)
        .bind(delegation.delegated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_application(&self, id: ApplicationId) -> Result<Option<CoGuideDelegation>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT application_id, delegated_by, co_guides, reviews, delegated_at
            FROM co_guide_delegations
            WHERE application_id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_delegation).transpose()
    }

    async fn find_for_invitee(&self, user: &UserId) -> Result<Vec<CoGuideDelegation>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT application_id, delegated_by, co_guides, reviews, delegated_at
            FROM co_guide_delegations
            WHERE delegated_by <> $1
              AND (co_guides @> jsonb_build_array($1::text) OR co_guides @> jsonb_build_array($2::text))
            ORDER BY delegated_at ASC
            "#,
        )
        .bind(user.as_str())
        .bind(ANY_FACULTY)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_delegation).collect()
    }

    async fn delete(&self, id: ApplicationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM co_guide_delegations WHERE application_id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
