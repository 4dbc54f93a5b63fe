// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Context
//!
//! The identity behind a request is resolved once, at the edge, and passed
//! explicitly into every service call as a [`RequestContext`]. Services never
//! look the session up again, so one request sees one immutable snapshot of
//! who is calling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::error::AllocationError;
use crate::domain::user::{Role, User, UserId};

/// The resolved caller of an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self { user_id: user_id.into(), role }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(Principal),
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity: Identity,
    pub request_id: Uuid,
}

impl RequestContext {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(Identity::Anonymous)
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self::new(Identity::Authenticated(principal))
    }

    /// Context used by scheduled sweeps and the CLI.
    pub fn system() -> Self {
        Self::authenticated(Principal::new("system", Role::Admin))
    }

    pub fn principal(&self) -> Result<&Principal, AllocationError> {
        match &self.identity {
            Identity::Authenticated(principal) => Ok(principal),
            Identity::Anonymous => Err(AllocationError::Unauthenticated),
        }
    }
}

/// Opaque bearer token identifying a login session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: SessionToken,
    pub principal: Principal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OneTimeCodePurpose {
    Signup,
    PasswordReset,
}

/// Numeric code mailed to an address to prove ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub purpose: OneTimeCodePurpose,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// Registration waiting for this code, for signups.
    pub pending_user: Option<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_context_is_unauthenticated() {
        let ctx = RequestContext::anonymous();
        assert!(matches!(ctx.principal(), Err(AllocationError::Unauthenticated)));
    }

    #[test]
    fn test_generated_tokens_differ() {
        assert_ne!(SessionToken::generate(), SessionToken::generate());
    }
}
