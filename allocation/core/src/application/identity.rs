// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity & Role Directory
//!
//! Accounts, login sessions and the mailed one-time codes that gate signup
//! and password reset. A user's role is fixed when the account is created.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::notifier::Notifier;
use crate::domain::capability::Operation;
use crate::domain::config::IdentityConfig;
use crate::domain::context::{
    Identity, OneTimeCode, OneTimeCodePurpose, Principal, RequestContext, Session, SessionToken,
};
use crate::domain::error::AllocationError;
use crate::domain::notification::Notification;
use crate::domain::repository::{OneTimeCodeRepository, SessionRepository, UserRepository};
use crate::domain::user::{NewUser, Role, User, UserId, UserProfile};
use crate::infrastructure::credentials::{codes_match, generate_code, hash_password, verify_password};

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Unknown or expired tokens resolve to `Anonymous`.
    async fn resolve_session(&self, token: Option<&SessionToken>) -> Result<Identity, AllocationError>;
    async fn login(&self, id: &UserId, password: &str) -> Result<SessionToken, AllocationError>;
    async fn logout(&self, token: &SessionToken) -> Result<(), AllocationError>;
    async fn begin_signup(&self, registration: NewUser) -> Result<(), AllocationError>;
    async fn verify_signup(&self, email: &str, code: &str) -> Result<UserProfile, AllocationError>;
    async fn begin_password_reset(&self, email: &str) -> Result<(), AllocationError>;
    async fn reset_password(&self, email: &str, code: &str, new_password: &str) -> Result<(), AllocationError>;
    async fn profile(&self, ctx: &RequestContext) -> Result<UserProfile, AllocationError>;
    async fn faculty_directory(&self, ctx: &RequestContext) -> Result<Vec<UserProfile>, AllocationError>;
    async fn provision_user(&self, ctx: &RequestContext, user: NewUser) -> Result<UserProfile, AllocationError>;
    async fn list_users(&self, ctx: &RequestContext, role: Option<Role>) -> Result<Vec<UserProfile>, AllocationError>;
}

pub struct StandardIdentityService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    codes: Arc<dyn OneTimeCodeRepository>,
    notifier: Notifier,
    config: IdentityConfig,
}

/// Lifetimes too large for chrono are capped at ten years.
fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(3650))
}

fn validate_registration(registration: &NewUser) -> Result<(), AllocationError> {
    if registration.id.as_str().trim().is_empty() {
        return Err(AllocationError::NotEligible("an id (roll number) is required".to_string()));
    }
    if registration.full_name.trim().is_empty() {
        return Err(AllocationError::NotEligible("a full name is required".to_string()));
    }
    let email = registration.email.trim();
    if email.len() < 3 || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(AllocationError::NotEligible("a valid email address is required".to_string()));
    }
    if registration.password.is_empty() {
        return Err(AllocationError::NotEligible("a password is required".to_string()));
    }
    Ok(())
}

fn account_exists() -> AllocationError {
    AllocationError::NotEligible("an account with this id or email already exists".to_string())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl StandardIdentityService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        codes: Arc<dyn OneTimeCodeRepository>,
        notifier: Notifier,
        config: IdentityConfig,
    ) -> Self {
        Self {
            users,
            sessions,
            codes,
            notifier,
            config,
        }
    }

    async fn ensure_unregistered(&self, id: &UserId, email: &str) -> Result<(), AllocationError> {
        if self.users.find_by_id(id).await?.is_some() || self.users.find_by_email(email).await?.is_some() {
            return Err(account_exists());
        }
        Ok(())
    }

    fn build_user(registration: NewUser) -> User {
        User::new(
            UserId::new(registration.id.as_str().trim()),
            registration.role,
            registration.full_name.trim().to_string(),
            normalize_email(&registration.email),
            registration.department.trim().to_string(),
            hash_password(&registration.password),
        )
    }

    async fn issue_code(
        &self,
        purpose: OneTimeCodePurpose,
        email: &str,
        pending_user: Option<User>,
    ) -> Result<String, AllocationError> {
        let code = generate_code(self.config.otp_length);
        self.codes
            .save(&OneTimeCode {
                purpose,
                email: email.to_string(),
                code: code.clone(),
                expires_at: Utc::now() + to_chrono(self.config.otp_ttl),
                pending_user,
            })
            .await?;
        Ok(code)
    }

    /// Consume a code. A wrong code leaves the stored one in place so the
    /// user can retry until it expires.
    async fn redeem_code(
        &self,
        purpose: OneTimeCodePurpose,
        email: &str,
        code: &str,
    ) -> Result<OneTimeCode, AllocationError> {
        let invalid = || AllocationError::NotEligible("the code is invalid or has expired".to_string());
        let stored = self.codes.find(purpose, email).await?.ok_or_else(invalid)?;
        if stored.expires_at <= Utc::now() {
            self.codes.delete(purpose, email).await?;
            return Err(invalid());
        }
        if !codes_match(&stored.code, code) {
            warn!(email = %email, purpose = ?purpose, "One-time code mismatch");
            return Err(invalid());
        }
        self.codes.delete(purpose, email).await?;
        Ok(stored)
    }
}

#[async_trait]
impl IdentityService for StandardIdentityService {
    async fn resolve_session(&self, token: Option<&SessionToken>) -> Result<Identity, AllocationError> {
        let Some(token) = token else {
            return Ok(Identity::Anonymous);
        };
        match self.sessions.find(token).await? {
            Some(session) if session.is_expired(Utc::now()) => {
                self.sessions.delete(token).await?;
                Ok(Identity::Anonymous)
            }
            Some(session) => Ok(Identity::Authenticated(session.principal)),
            None => Ok(Identity::Anonymous),
        }
    }

    async fn login(&self, id: &UserId, password: &str) -> Result<SessionToken, AllocationError> {
        let user = self.users.find_by_id(id).await?;
        let Some(user) = user.filter(|u| verify_password(&u.password, password)) else {
            warn!(user = %id, "Invalid ID or password");
            metrics::counter!("btp_logins_total", "outcome" => "rejected").increment(1);
            return Err(AllocationError::Unauthenticated);
        };

        let now = Utc::now();
        let session = Session {
            token: SessionToken::generate(),
            principal: Principal::new(user.id.clone(), user.role()),
            created_at: now,
            expires_at: now + to_chrono(self.config.session_ttl),
        };
        self.sessions.save(&session).await?;

        info!(user = %user.id, role = %user.role(), "User logged in");
        metrics::counter!("btp_logins_total", "outcome" => "accepted").increment(1);
        Ok(session.token)
    }

    async fn logout(&self, token: &SessionToken) -> Result<(), AllocationError> {
        self.sessions.delete(token).await?;
        Ok(())
    }

    async fn begin_signup(&self, registration: NewUser) -> Result<(), AllocationError> {
        if registration.role == Role::Admin {
            return Err(AllocationError::NotEligible(
                "administrator accounts are provisioned, not self-registered".to_string(),
            ));
        }
        validate_registration(&registration)?;
        let user = Self::build_user(registration);
        self.ensure_unregistered(&user.id, &user.email).await?;

        let email = user.email.clone();
        let code = self.issue_code(OneTimeCodePurpose::Signup, &email, Some(user)).await?;
        info!(email = %email, "Signup started");

        self.notifier
            .notify(Notification::new(
                email,
                "Your BTP portal verification code",
                format!(
                    "Your verification code is {}. It expires in {} minutes.",
                    code,
                    self.config.otp_ttl.as_secs().div_ceil(60)
                ),
            ))
            .await;
        Ok(())
    }

    async fn verify_signup(&self, email: &str, code: &str) -> Result<UserProfile, AllocationError> {
        let email = normalize_email(email);
        let stored = self.redeem_code(OneTimeCodePurpose::Signup, &email, code).await?;
        let user = stored
            .pending_user
            .ok_or_else(|| AllocationError::NotEligible("no pending registration for this address".to_string()))?;

        // Someone may have registered the same id while the code was out.
        self.users.insert(&user).await.map_err(|e| match AllocationError::from(e) {
            AllocationError::Conflict => account_exists(),
            other => other,
        })?;

        info!(user = %user.id, role = %user.role(), "User registered");
        metrics::counter!("btp_users_registered_total").increment(1);
        Ok(user.profile())
    }

    async fn begin_password_reset(&self, email: &str) -> Result<(), AllocationError> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AllocationError::not_found("Account"))?;

        let code = self.issue_code(OneTimeCodePurpose::PasswordReset, &email, None).await?;
        info!(user = %user.id, "Password reset requested");

        self.notifier
            .notify(Notification::new(
                email,
                "BTP portal password reset",
                format!("Use code {} to reset the password of {}.", code, user.id),
            ))
            .await;
        Ok(())
    }

    async fn reset_password(&self, email: &str, code: &str, new_password: &str) -> Result<(), AllocationError> {
        if new_password.is_empty() {
            return Err(AllocationError::NotEligible("a password is required".to_string()));
        }
        let email = normalize_email(email);
        self.redeem_code(OneTimeCodePurpose::PasswordReset, &email, code).await?;

        let mut user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AllocationError::not_found("Account"))?;
        user.set_password(hash_password(new_password));
        self.users.save(&user).await?;
        self.sessions.delete_for_user(&user.id).await?;

        info!(user = %user.id, "Password reset; sessions revoked");
        Ok(())
    }

    async fn profile(&self, ctx: &RequestContext) -> Result<UserProfile, AllocationError> {
        let admitted = Operation::ViewProfile.admit(ctx)?;
        self.users
            .find_by_id(admitted.user_id())
            .await?
            .map(|u| u.profile())
            .ok_or_else(|| AllocationError::not_found("User"))
    }

    async fn faculty_directory(&self, ctx: &RequestContext) -> Result<Vec<UserProfile>, AllocationError> {
        Operation::FacultyDirectory.admit(ctx)?;
        let faculty = self.users.list_by_role(Role::Faculty).await?;
        Ok(faculty.iter().map(User::profile).collect())
    }

    async fn provision_user(&self, ctx: &RequestContext, registration: NewUser) -> Result<UserProfile, AllocationError> {
        let admitted = Operation::ProvisionUser.admit(ctx)?;
        validate_registration(&registration)?;
        let user = Self::build_user(registration);
        self.ensure_unregistered(&user.id, &user.email).await?;
        self.users.insert(&user).await.map_err(|e| match AllocationError::from(e) {
            AllocationError::Conflict => account_exists(),
            other => other,
        })?;

        info!(user = %user.id, role = %user.role(), by = %admitted.user_id(), "User provisioned");
        Ok(user.profile())
    }

    async fn list_users(&self, ctx: &RequestContext, role: Option<Role>) -> Result<Vec<UserProfile>, AllocationError> {
        Operation::ViewUsers.admit(ctx)?;
        let roles = match role {
            Some(role) => vec![role],
            None => vec![Role::Admin, Role::Faculty, Role::Student],
        };
        let mut profiles = Vec::new();
        for role in roles {
            profiles.extend(self.users.list_by_role(role).await?.iter().map(User::profile));
        }
        Ok(profiles)
    }
}
