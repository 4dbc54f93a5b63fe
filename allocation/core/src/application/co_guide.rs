// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Co-Guide Delegation
//!
//! The owning faculty may ask other faculty to review an application. An
//! approval that satisfies the configured [`CoGuidePolicy`] approves the
//! application on the co-guide's behalf through the workflow engine; a
//! rejection is only recorded.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::application::notifier::Notifier;
use crate::application::workflow::WorkflowService;
use crate::domain::capability::{Operation, OwnershipFacts};
use crate::domain::co_guide::{CoGuideDelegation, CoGuidePolicy, CoGuideSelection, ReviewStatus};
use crate::domain::context::RequestContext;
use crate::domain::error::AllocationError;
use crate::domain::events::AllocationEvent;
use crate::domain::ledger::{Application, ApplicationId, ApplicationStatus, StatusAction};
use crate::domain::notification::Notification;
use crate::domain::repository::{ApplicationRepository, CoGuideRepository, ProjectRepository, UserRepository};
use crate::domain::user::{Role, UserId};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Serialize)]
pub struct CoGuideResponse {
    pub review: ReviewStatus,
    pub application_status: ApplicationStatus,
    /// Whether this response approved the application.
    pub approved_application: bool,
}

/// A delegation as seen by one invitee.
#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    pub application: Application,
    pub project_name: Option<String>,
    pub delegated_by: UserId,
    pub my_review: ReviewStatus,
}

#[async_trait]
pub trait CoGuideService: Send + Sync {
    /// Replaces any earlier delegation of the application.
    async fn delegate(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
        selection: CoGuideSelection,
    ) -> Result<CoGuideDelegation, AllocationError>;

    async fn respond(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
        decision: StatusAction,
    ) -> Result<CoGuideResponse, AllocationError>;

    /// The selection exactly as last written, `None` if never delegated.
    async fn view_selected(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
    ) -> Result<Option<CoGuideSelection>, AllocationError>;

    async fn inbox(&self, ctx: &RequestContext) -> Result<Vec<InboxEntry>, AllocationError>;
}

pub struct StandardCoGuideService {
    users: Arc<dyn UserRepository>,
    projects: Arc<dyn ProjectRepository>,
    applications: Arc<dyn ApplicationRepository>,
    co_guides: Arc<dyn CoGuideRepository>,
    workflow: Arc<dyn WorkflowService>,
    notifier: Notifier,
    event_bus: EventBus,
    policy: CoGuidePolicy,
}

impl StandardCoGuideService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserRepository>,
        projects: Arc<dyn ProjectRepository>,
        applications: Arc<dyn ApplicationRepository>,
        co_guides: Arc<dyn CoGuideRepository>,
        workflow: Arc<dyn WorkflowService>,
        notifier: Notifier,
        event_bus: EventBus,
        policy: CoGuidePolicy,
    ) -> Self {
        Self {
            users,
            projects,
            applications,
            co_guides,
            workflow,
            notifier,
            event_bus,
            policy,
        }
    }

    async fn load_application(&self, id: ApplicationId) -> Result<Application, AllocationError> {
        self.applications
            .find_by_id(id)
            .await?
            .ok_or_else(|| AllocationError::not_found("Application"))
    }

    fn ensure_undecided(application: &Application) -> Result<(), AllocationError> {
        match application.status() {
            ApplicationStatus::Pending | ApplicationStatus::Approved => Ok(()),
            status => Err(AllocationError::InvalidState(format!(
                "co-guide review is closed once an application is {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl CoGuideService for StandardCoGuideService {
    async fn delegate(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
        selection: CoGuideSelection,
    ) -> Result<CoGuideDelegation, AllocationError> {
        let admitted = Operation::Delegate.admit(ctx)?;
        let application = self.load_application(application_id).await?;
        let project = self
            .projects
            .find_by_id(application.project_id)
            .await?
            .ok_or_else(|| AllocationError::not_found("Project"))?;
        admitted.check(&OwnershipFacts::project(&project.owner))?;
        Self::ensure_undecided(&application)?;

        let mut invitees = Vec::new();
        if let CoGuideSelection::Faculty(ids) = &selection {
            if ids.contains(&project.owner) {
                return Err(AllocationError::InvalidState(
                    "the owning faculty cannot be a co-guide of their own project".to_string(),
                ));
            }
            for id in ids {
                match self.users.find_by_id(id).await? {
                    Some(user) if user.role() == Role::Faculty => invitees.push(user),
                    _ => {
                        return Err(AllocationError::InvalidState(format!("{} is not a faculty member", id)));
                    }
                }
            }
        }

        let delegation = CoGuideDelegation::new(application.id, admitted.user_id().clone(), selection);
        self.co_guides.save(&delegation).await?;

        info!(
            application_id = %application.id,
            co_guides = ?delegation.selection.to_values(),
            "Co-guides delegated"
        );
        metrics::counter!("btp_co_guide_delegations_total").increment(1);
        self.event_bus.publish(AllocationEvent::CoGuidesDelegated {
            application_id: application.id,
            delegated_by: delegation.delegated_by.clone(),
            co_guides: delegation.selection.to_values(),
            delegated_at: delegation.delegated_at,
        });

        for invitee in invitees {
            self.notifier
                .notify(Notification::new(
                    invitee.email,
                    "BTP co-guide request",
                    format!(
                        "{} asked you to review {}'s application for \"{}\".",
                        project.owner, application.student_id, project.name
                    ),
                ))
                .await;
        }

        Ok(delegation)
    }

    async fn respond(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
        decision: StatusAction,
    ) -> Result<CoGuideResponse, AllocationError> {
        let admitted = Operation::RespondCoGuide.admit(ctx)?;
        let application = self.load_application(application_id).await?;
        let mut delegation = self
            .co_guides
            .find_by_application(application.id)
            .await?
            .ok_or(AllocationError::NotInvited)?;
        delegation.record(admitted.user_id(), decision)?;
        Self::ensure_undecided(&application)?;

        self.co_guides.save(&delegation).await?;
        let review = delegation.review_of(admitted.user_id());
        info!(
            application_id = %application.id,
            co_guide = %admitted.user_id(),
            review = review.as_str(),
            "Co-guide responded"
        );
        self.event_bus.publish(AllocationEvent::CoGuideResponded {
            application_id: application.id,
            co_guide: admitted.user_id().clone(),
            review,
            responded_at: Utc::now(),
        });

        if decision == StatusAction::Approve && delegation.approves(self.policy) {
            let status = self.workflow.set_status(ctx, application.id, StatusAction::Approve).await?;
            return Ok(CoGuideResponse {
                review,
                application_status: status,
                approved_application: true,
            });
        }

        Ok(CoGuideResponse {
            review,
            application_status: application.status(),
            approved_application: false,
        })
    }

    async fn view_selected(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
    ) -> Result<Option<CoGuideSelection>, AllocationError> {
        Operation::ViewSelectedCoGuides.admit(ctx)?;
        let application = self.load_application(application_id).await?;
        let delegation = self.co_guides.find_by_application(application.id).await?;
        Ok(delegation.map(|d| d.selection))
    }

    async fn inbox(&self, ctx: &RequestContext) -> Result<Vec<InboxEntry>, AllocationError> {
        let admitted = Operation::CoGuideInbox.admit(ctx)?;
        let me = admitted.user_id();

        let mut entries = Vec::new();
        for delegation in self.co_guides.find_for_invitee(me).await? {
            let Some(application) = self.applications.find_by_id(delegation.application_id).await? else {
                continue;
            };
            let project_name = self
                .projects
                .find_by_id(application.project_id)
                .await?
                .map(|p| p.name);
            entries.push(InboxEntry {
                my_review: delegation.review_of(me),
                delegated_by: delegation.delegated_by,
                project_name,
                application,
            });
        }
        Ok(entries)
    }
}
