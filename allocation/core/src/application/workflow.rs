// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Allocation Workflow Engine
//!
//! Owns every change to the application ledger. Each operation follows the
//! same shape:
//!
//! 1. `Operation::admit` before any storage read
//! 2. load the rows and the ownership facts, then `Admitted::check`
//! 3. apply transitions in memory, validated by the ledger's table
//! 4. commit with one `update_many` (all rows or none, version checked)
//! 5. after the commit: delegations, events, metrics, mail
//!
//! A losing concurrent writer gets `AllocationError::Conflict` and nothing
//! it computed is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::notifier::Notifier;
use crate::domain::capability::{Operation, OwnershipFacts};
use crate::domain::config::WorkflowConfig;
use crate::domain::context::RequestContext;
use crate::domain::error::AllocationError;
use crate::domain::events::AllocationEvent;
use crate::domain::ledger::{Application, ApplicationId, ApplicationStatus, StatusAction, Transition};
use crate::domain::notification::Notification;
use crate::domain::project::{Project, ProjectId};
use crate::domain::repository::{
    ApplicationRepository, CoGuideRepository, ProjectRepository, RepositoryError, UserRepository,
};
use crate::domain::user::{UserId, UserProfile};
use crate::infrastructure::event_bus::EventBus;

/// Withdrawal retries when applications change underneath a project delete.
const WITHDRAW_ATTEMPTS: usize = 3;

/// An application joined with what a reader needs to display it.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    /// `None` once the project has been deleted.
    pub project_name: Option<String>,
    pub applicant: Option<UserProfile>,
}

/// Outcome of one finalize sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FinalizeSummary {
    pub confirmed: Vec<ApplicationId>,
    pub rejected: usize,
    /// Temporarily confirmed choices still inside the confirmation window.
    pub waiting: usize,
    /// Students skipped because their applications changed during the sweep.
    pub conflicts: Vec<UserId>,
    /// Temporarily confirmed choices closed because their project is gone.
    pub orphaned: Vec<ApplicationId>,
}

/// What happened to one finalize candidate.
enum Finalized {
    Confirmed { rejected: usize },
    /// The project was deleted; only the candidate was closed.
    Orphaned,
}

#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn apply(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<Application, AllocationError>;

    async fn set_status(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
        action: StatusAction,
    ) -> Result<ApplicationStatus, AllocationError>;

    async fn confirm(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<ApplicationStatus, AllocationError>;

    async fn finalize_confirmations(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<FinalizeSummary, AllocationError>;

    async fn delete_application(&self, ctx: &RequestContext, application_id: ApplicationId) -> Result<(), AllocationError>;

    /// Reject every open application of a project about to be deleted.
    /// Returns how many were withdrawn.
    async fn withdraw_project(&self, ctx: &RequestContext, project: &Project) -> Result<usize, AllocationError>;

    async fn faculty_applications(
        &self,
        ctx: &RequestContext,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationView>, AllocationError>;

    async fn student_applications(&self, ctx: &RequestContext) -> Result<Vec<ApplicationView>, AllocationError>;
}

pub struct StandardWorkflowService {
    users: Arc<dyn UserRepository>,
    projects: Arc<dyn ProjectRepository>,
    applications: Arc<dyn ApplicationRepository>,
    co_guides: Arc<dyn CoGuideRepository>,
    notifier: Notifier,
    event_bus: EventBus,
    config: WorkflowConfig,
}

impl StandardWorkflowService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        projects: Arc<dyn ProjectRepository>,
        applications: Arc<dyn ApplicationRepository>,
        co_guides: Arc<dyn CoGuideRepository>,
        notifier: Notifier,
        event_bus: EventBus,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            users,
            projects,
            applications,
            co_guides,
            notifier,
            event_bus,
            config,
        }
    }

    async fn load_application(&self, id: ApplicationId) -> Result<Application, AllocationError> {
        self.applications
            .find_by_id(id)
            .await?
            .ok_or_else(|| AllocationError::not_found("Application"))
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project, AllocationError> {
        self.projects
            .find_by_id(id)
            .await?
            .ok_or_else(|| AllocationError::not_found("Project"))
    }

    /// Write the batch and bump the in-memory copies to the stored versions.
    async fn commit(&self, rows: &mut [Application]) -> Result<(), AllocationError> {
        if let Err(e) = self.applications.update_many(rows).await {
            if let RepositoryError::Conflict(detail) = &e {
                warn!(rows = rows.len(), detail = %detail, "Optimistic check failed");
                metrics::counter!("btp_workflow_conflicts_total").increment(1);
            }
            return Err(e.into());
        }
        for row in rows.iter_mut() {
            row.version += 1;
        }
        Ok(())
    }

    async fn discard_delegation(&self, application_id: ApplicationId) -> Result<(), AllocationError> {
        if self.co_guides.delete(application_id).await? {
            debug!(application_id = %application_id, "Co-guide delegation discarded");
        }
        Ok(())
    }

    fn publish_change(&self, application: &Application, from: ApplicationStatus, changed_by: &UserId) {
        self.event_bus.publish(AllocationEvent::ApplicationStatusChanged {
            application_id: application.id,
            project_id: application.project_id,
            student: application.student_id.clone(),
            from,
            to: application.status(),
            changed_by: changed_by.clone(),
            changed_at: application.updated_at,
        });
        metrics::counter!("btp_application_transitions_total", "to" => application.status().as_str()).increment(1);
    }

    /// Mail a user by id. Unknown users and lookup failures only log.
    async fn mail_user(&self, user: &UserId, subject: &str, body: String) {
        match self.users.find_by_id(user).await {
            Ok(Some(user)) => {
                self.notifier.notify(Notification::new(user.email, subject, body)).await;
            }
            Ok(None) => warn!(user = %user, "No account to notify"),
            Err(e) => warn!(user = %user, error = %e, "Could not look up notification address"),
        }
    }

    async fn project_names(&self, ids: impl Iterator<Item = ProjectId>) -> Result<HashMap<ProjectId, String>, AllocationError> {
        let mut names = HashMap::new();
        for id in ids {
            if names.contains_key(&id) {
                continue;
            }
            if let Some(project) = self.projects.find_by_id(id).await? {
                names.insert(id, project.name);
            }
        }
        Ok(names)
    }

    /// Close an application whose project has disappeared.
    async fn close_orphan(&self, mut application: Application) -> Result<(), AllocationError> {
        let from = match application.withdraw()? {
            Transition::Unchanged => return Ok(()),
            Transition::Changed(from) => from,
        };
        self.commit(std::slice::from_mut(&mut application)).await?;
        self.discard_delegation(application.id).await?;
        warn!(
            application_id = %application.id,
            project_id = %application.project_id,
            "Closed application on a deleted project"
        );
        self.publish_change(&application, from, &UserId::new("system"));
        Ok(())
    }

    /// Promote one student's temporarily confirmed choice and reject the rest.
    async fn finalize_student(&self, candidate: &Application, now: DateTime<Utc>) -> Result<Finalized, AllocationError> {
        let Some(mut project) = self.projects.find_by_id(candidate.project_id).await? else {
            self.close_orphan(candidate.clone()).await?;
            return Ok(Finalized::Orphaned);
        };

        let mut rows: Vec<Application> = self
            .applications
            .find_by_student(&candidate.student_id)
            .await?
            .into_iter()
            .filter(Application::is_open)
            .collect();

        let still_chosen = rows
            .iter()
            .any(|a| a.id == candidate.id && a.version == candidate.version && a.status() == ApplicationStatus::TemporarilyConfirmed);
        if !still_chosen {
            return Err(AllocationError::Conflict);
        }

        let mut changes = Vec::with_capacity(rows.len());
        for row in rows.iter_mut() {
            let from = row.status();
            if row.id == candidate.id {
                row.transition(ApplicationStatus::Confirmed)?;
            } else {
                row.withdraw()?;
            }
            changes.push(from);
        }
        self.commit(&mut rows).await?;

        let system = UserId::new("system");
        let mut rejected = 0;
        for (row, from) in rows.iter().zip(changes) {
            self.discard_delegation(row.id).await?;
            self.publish_change(row, from, &system);
            if row.status() == ApplicationStatus::Rejected {
                rejected += 1;
            }
        }

        if project.add_student(candidate.student_id.clone()) {
            self.projects.save(&project).await?;
        }
        self.event_bus.publish(AllocationEvent::AllocationFinalized {
            application_id: candidate.id,
            project_id: project.id,
            student: candidate.student_id.clone(),
            finalized_at: now,
        });
        info!(
            student = %candidate.student_id,
            project = %project.name,
            rejected,
            "Allocation finalized"
        );
        metrics::counter!("btp_allocations_finalized_total").increment(1);

        self.mail_user(
            &candidate.student_id,
            "BTP allocation confirmed",
            format!("Your allocation to \"{}\" is now confirmed.", project.name),
        )
        .await;
        self.mail_user(
            &project.owner,
            "BTP allocation confirmed",
            format!("{} is now confirmed for your project \"{}\".", candidate.student_id, project.name),
        )
        .await;

        Ok(Finalized::Confirmed { rejected })
    }
}

#[async_trait]
impl WorkflowService for StandardWorkflowService {
    async fn apply(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<Application, AllocationError> {
        let admitted = Operation::Apply.admit(ctx)?;
        let student = admitted.user_id();
        let project = self.load_project(project_id).await?;

        let existing = self.applications.find_by_student(student).await?;
        if existing.iter().any(|a| a.status() == ApplicationStatus::Confirmed) {
            return Err(AllocationError::NotEligible("you already hold a confirmed project".to_string()));
        }
        if existing
            .iter()
            .any(|a| a.project_id == project.id && a.status() != ApplicationStatus::Rejected)
        {
            return Err(AllocationError::AlreadyApplied);
        }

        let application = Application::new(student.clone(), project.id);
        // The repository enforces the same rule against a racing apply.
        self.applications.insert(&application).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AllocationError::AlreadyApplied,
            other => other.into(),
        })?;

        // A project delete removes the row before withdrawing, so a row
        // inserted after that withdrawal is closed here.
        if self.projects.find_by_id(project.id).await?.is_none() {
            match self.close_orphan(application).await {
                Ok(()) | Err(AllocationError::Conflict) => {}
                Err(e) => return Err(e),
            }
            return Err(AllocationError::not_found("Project"));
        }

        info!(student = %student, project = %project.name, application_id = %application.id, "Application submitted");
        metrics::counter!("btp_applications_submitted_total").increment(1);
        self.event_bus.publish(AllocationEvent::ApplicationSubmitted {
            application_id: application.id,
            project_id: project.id,
            student: student.clone(),
            submitted_at: application.created_at,
        });
        Ok(application)
    }

    async fn set_status(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
        action: StatusAction,
    ) -> Result<ApplicationStatus, AllocationError> {
        let admitted = Operation::SetStatus.admit(ctx)?;
        let mut application = self.load_application(application_id).await?;
        let project = self.load_project(application.project_id).await?;
        let delegation = self.co_guides.find_by_application(application.id).await?;
        admitted.check(&OwnershipFacts {
            project_owner: Some(&project.owner),
            delegation: delegation.as_ref(),
            ..Default::default()
        })?;

        let from = match application.decide(action)? {
            Transition::Unchanged => {
                debug!(application_id = %application.id, status = %application.status(), "Status unchanged");
                return Ok(application.status());
            }
            Transition::Changed(from) => from,
        };
        self.commit(std::slice::from_mut(&mut application)).await?;
        self.discard_delegation(application.id).await?;

        info!(
            application_id = %application.id,
            from = %from,
            to = %application.status(),
            by = %admitted.user_id(),
            "Application status changed"
        );
        self.publish_change(&application, from, admitted.user_id());
        self.mail_user(
            &application.student_id,
            "BTP application update",
            format!(
                "Your application for \"{}\" is now {}.",
                project.name,
                application.status()
            ),
        )
        .await;

        Ok(application.status())
    }

    async fn confirm(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<ApplicationStatus, AllocationError> {
        let admitted = Operation::Confirm.admit(ctx)?;
        let student = admitted.user_id();
        self.load_project(project_id).await?;

        let applications = self.applications.find_by_student(student).await?;
        if applications.iter().any(|a| a.status() == ApplicationStatus::Confirmed) {
            return Err(AllocationError::NotEligible("you already hold a confirmed project".to_string()));
        }
        let target = applications
            .iter()
            .find(|a| a.project_id == project_id && a.status() != ApplicationStatus::Rejected)
            .ok_or_else(|| AllocationError::NotEligible("you have no open application for this project".to_string()))?;
        if target.status() != ApplicationStatus::Approved {
            return Err(AllocationError::NotEligible(format!(
                "the application is {}, only Approved applications can be confirmed",
                target.status()
            )));
        }
        let target_id = target.id;

        // Every open application of the student goes into the batch so a
        // racing confirm or approval invalidates this one.
        let mut rows: Vec<Application> = applications.into_iter().filter(Application::is_open).collect();
        let mut changes = Vec::new();
        for row in rows.iter_mut() {
            let from = row.status();
            if row.id == target_id {
                row.transition(ApplicationStatus::TemporarilyConfirmed)?;
                changes.push((row.id, from));
            } else if from == ApplicationStatus::TemporarilyConfirmed {
                row.transition(ApplicationStatus::Approved)?;
                changes.push((row.id, from));
            } else {
                row.touch();
            }
        }
        self.commit(&mut rows).await?;

        for (id, from) in changes {
            if let Some(row) = rows.iter().find(|r| r.id == id) {
                self.publish_change(row, from, student);
            }
        }
        info!(student = %student, project_id = %project_id, "Project temporarily confirmed");
        metrics::counter!("btp_confirmations_total").increment(1);

        Ok(ApplicationStatus::TemporarilyConfirmed)
    }

    async fn finalize_confirmations(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<FinalizeSummary, AllocationError> {
        let admitted = Operation::FinalizeConfirmations.admit(ctx)?;
        let window = chrono::Duration::from_std(self.config.confirmation_window)
            .map_err(|e| AllocationError::InvalidState(format!("confirmation window out of range: {}", e)))?;

        let candidates = self
            .applications
            .find_by_status(ApplicationStatus::TemporarilyConfirmed)
            .await?;

        let mut summary = FinalizeSummary::default();
        for candidate in candidates {
            if candidate.updated_at + window > now {
                summary.waiting += 1;
                continue;
            }
            match self.finalize_student(&candidate, now).await {
                Ok(Finalized::Confirmed { rejected }) => {
                    summary.confirmed.push(candidate.id);
                    summary.rejected += rejected;
                }
                Ok(Finalized::Orphaned) => summary.orphaned.push(candidate.id),
                Err(AllocationError::Conflict) => {
                    warn!(student = %candidate.student_id, "Skipping student changed during finalize sweep");
                    summary.conflicts.push(candidate.student_id.clone());
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            by = %admitted.user_id(),
            confirmed = summary.confirmed.len(),
            rejected = summary.rejected,
            waiting = summary.waiting,
            conflicts = summary.conflicts.len(),
            orphaned = summary.orphaned.len(),
            "Finalize sweep complete"
        );
        Ok(summary)
    }

    async fn delete_application(&self, ctx: &RequestContext, application_id: ApplicationId) -> Result<(), AllocationError> {
        let admitted = Operation::DeleteApplication.admit(ctx)?;
        let application = self.load_application(application_id).await?;
        admitted.check(&OwnershipFacts {
            applicant: Some(&application.student_id),
            ..Default::default()
        })?;
        if !matches!(
            application.status(),
            ApplicationStatus::Pending | ApplicationStatus::Approved
        ) {
            warn!(
                application_id = %application.id,
                status = %application.status(),
                "Refusing to delete a decided application"
            );
            return Err(AllocationError::Unauthorized);
        }

        self.applications.delete(application.id, application.version).await?;
        self.discard_delegation(application.id).await?;

        info!(application_id = %application.id, student = %application.student_id, "Application deleted");
        self.event_bus.publish(AllocationEvent::ApplicationDeleted {
            application_id: application.id,
            project_id: application.project_id,
            student: application.student_id,
            deleted_at: Utc::now(),
        });
        Ok(())
    }

    async fn withdraw_project(&self, ctx: &RequestContext, project: &Project) -> Result<usize, AllocationError> {
        let admitted = Operation::DeleteProject.admit(ctx)?;
        admitted.check(&OwnershipFacts::project(&project.owner))?;

        let mut attempt = 0;
        let (rows, changes) = loop {
            attempt += 1;
            let mut rows: Vec<Application> = self
                .applications
                .find_by_project(project.id)
                .await?
                .into_iter()
                .filter(Application::is_open)
                .collect();
            let mut changes = Vec::with_capacity(rows.len());
            for row in rows.iter_mut() {
                changes.push(row.status());
                row.withdraw()?;
            }
            if rows.is_empty() {
                return Ok(0);
            }
            match self.commit(&mut rows).await {
                Ok(()) => break (rows, changes),
                Err(AllocationError::Conflict) if attempt < WITHDRAW_ATTEMPTS => {
                    debug!(project_id = %project.id, attempt, "Retrying withdrawal");
                }
                Err(e) => return Err(e),
            }
        };

        for (row, from) in rows.iter().zip(changes) {
            self.discard_delegation(row.id).await?;
            self.publish_change(row, from, admitted.user_id());
            self.mail_user(
                &row.student_id,
                "BTP project withdrawn",
                format!("The project \"{}\" was withdrawn; your application is closed.", project.name),
            )
            .await;
        }
        info!(project_id = %project.id, withdrawn = rows.len(), "Project applications withdrawn");
        Ok(rows.len())
    }

    async fn faculty_applications(
        &self,
        ctx: &RequestContext,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationView>, AllocationError> {
        let admitted = Operation::ListApplications.admit(ctx)?;
        let projects = self.projects.find_by_owner(admitted.user_id()).await?;

        let mut profiles: HashMap<UserId, Option<UserProfile>> = HashMap::new();
        let mut views = Vec::new();
        for project in projects {
            for application in self.applications.find_by_project(project.id).await? {
                if status.is_some_and(|s| s != application.status()) {
                    continue;
                }
                if !profiles.contains_key(&application.student_id) {
                    let profile = self.users.find_by_id(&application.student_id).await?.map(|u| u.profile());
                    profiles.insert(application.student_id.clone(), profile);
                }
                views.push(ApplicationView {
                    applicant: profiles.get(&application.student_id).cloned().flatten(),
                    project_name: Some(project.name.clone()),
                    application,
                });
            }
        }
        Ok(views)
    }

    async fn student_applications(&self, ctx: &RequestContext) -> Result<Vec<ApplicationView>, AllocationError> {
        let admitted = Operation::ListOwnApplications.admit(ctx)?;
        let applications = self.applications.find_by_student(admitted.user_id()).await?;
        let names = self.project_names(applications.iter().map(|a| a.project_id)).await?;
        Ok(applications
            .into_iter()
            .map(|application| ApplicationView {
                project_name: names.get(&application.project_id).cloned(),
                applicant: None,
                application,
            })
            .collect())
    }
}
