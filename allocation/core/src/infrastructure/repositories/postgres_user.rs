// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, UserRepository};
use crate::domain::user::{PasswordHash, Role, User, UserId};

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &PgRow) -> Result<User, RepositoryError> {
        let role: String = row.try_get("role")?;
        let role = Role::parse(&role)
            .ok_or_else(|| RepositoryError::Serialization(format!("unknown role {:?}", role)))?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(User::restore(
            UserId(row.try_get("id")?),
            role,
            row.try_get("full_name")?,
            row.try_get("email")?,
            row.try_get("department")?,
            PasswordHash {
                salt: row.try_get("password_salt")?,
                digest: row.try_get("password_digest")?,
            },
            created_at,
        ))
    }
}

const USER_COLUMNS: &str =
    "id, role, full_name, email, department, password_salt, password_digest, created_at";

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn insert(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, role, full_name, email, department, password_salt, password_digest, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_str())
        .bind(user.role().as_str())
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.department)
        .bind(&user.password.salt)
        .bind(&user.password.digest)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, user: &User) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET full_name = $2, email = $3, department = $4, password_salt = $5, password_digest = $6
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.department)
        .bind(&user.password.salt)
        .bind(&user.password.digest)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY id ASC"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_user).collect()
    }
}
