// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Identity & Role Directory Aggregate
//!
//! A `User` is created once at signup and its [`Role`] never changes
//! afterwards. Students are identified by their roll number, faculty and
//! admins by their staff id; both live in the same [`UserId`] space.
//!
//! The password hash is kept on the aggregate but never leaves the
//! application layer: callers receive a [`UserProfile`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Login id of a user. For students this is the roll number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Closed set of roles. There is no escalation path between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Role::Student),
            "faculty" => Some(Role::Faculty),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Salted password digest, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub salt: String,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    role: Role,
    pub full_name: String,
    pub email: String,
    pub department: String,
    pub password: PasswordHash,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: UserId,
        role: Role,
        full_name: String,
        email: String,
        department: String,
        password: PasswordHash,
    ) -> Self {
        Self {
            id,
            role,
            full_name,
            email,
            department,
            password,
            created_at: Utc::now(),
        }
    }

    /// Rebuild a user from storage with its original creation time.
    pub fn restore(
        id: UserId,
        role: Role,
        full_name: String,
        email: String,
        department: String,
        password: PasswordHash,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            role,
            full_name,
            email,
            department,
            password,
            created_at,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn set_password(&mut self, password: PasswordHash) {
        self.password = password;
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            role: self.role,
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            department: self.department.clone(),
        }
    }
}

/// Read-only projection of a [`User`] that is safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub role: Role,
    pub full_name: String,
    pub email: String,
    pub department: String,
}

/// Signup form contents.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub id: UserId,
    pub role: Role,
    pub full_name: String,
    pub email: String,
    pub department: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_roundtrip() {
        for role in [Role::Student, Role::Faculty, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_profile_hides_password() {
        let user = User::new(
            UserId::new("21CS30035"),
            Role::Student,
            "Test Student".to_string(),
            "student@example.com".to_string(),
            "CSE".to_string(),
            PasswordHash { salt: "aa".to_string(), digest: "bb".to_string() },
        );
        let json = serde_json::to_value(user.profile()).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "student");
    }
}
