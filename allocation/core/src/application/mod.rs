// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit_log;
pub mod catalog;
pub mod co_guide;
pub mod grading;
pub mod identity;
pub mod notifier;
pub mod repository_factory;
pub mod workflow;

// Re-export services for convenience
pub use audit_log::EventAuditLog;
pub use catalog::{CatalogService, ProjectEntry, ProjectListing, StandardCatalogService};
pub use co_guide::{CoGuideResponse, CoGuideService, InboxEntry, StandardCoGuideService};
pub use grading::{GradingService, StandardGradingService};
pub use identity::{IdentityService, StandardIdentityService};
pub use notifier::Notifier;
pub use repository_factory::Repositories;
pub use workflow::{ApplicationView, FinalizeSummary, StandardWorkflowService, WorkflowService};

use std::sync::Arc;

use crate::domain::config::AllocationConfigSpec;
use crate::domain::files::FileStore;
use crate::domain::notification::NotificationSender;
use crate::infrastructure::event_bus::EventBus;

/// Every service, wired over one set of repositories.
#[derive(Clone)]
pub struct Services {
    pub identity: Arc<dyn IdentityService>,
    pub catalog: Arc<dyn CatalogService>,
    pub workflow: Arc<dyn WorkflowService>,
    pub co_guides: Arc<dyn CoGuideService>,
    pub grading: Arc<dyn GradingService>,
    pub event_bus: EventBus,
}

impl Services {
    pub fn new(
        repositories: &Repositories,
        files: Arc<dyn FileStore>,
        mail: Arc<dyn NotificationSender>,
        event_bus: EventBus,
        spec: &AllocationConfigSpec,
    ) -> Self {
        let notifier = Notifier::new(mail, spec.workflow.notification_timeout);

        let identity = Arc::new(StandardIdentityService::new(
            repositories.users.clone(),
            repositories.sessions.clone(),
            repositories.codes.clone(),
            notifier.clone(),
            spec.identity.clone(),
        ));
        let workflow: Arc<dyn WorkflowService> = Arc::new(StandardWorkflowService::new(
            repositories.users.clone(),
            repositories.projects.clone(),
            repositories.applications.clone(),
            repositories.co_guides.clone(),
            notifier.clone(),
            event_bus.clone(),
            spec.workflow.clone(),
        ));
        let catalog = Arc::new(StandardCatalogService::new(
            repositories.users.clone(),
            repositories.projects.clone(),
            repositories.applications.clone(),
            files.clone(),
            workflow.clone(),
            event_bus.clone(),
        ));
        let co_guides = Arc::new(StandardCoGuideService::new(
            repositories.users.clone(),
            repositories.projects.clone(),
            repositories.applications.clone(),
            repositories.co_guides.clone(),
            workflow.clone(),
            notifier,
            event_bus.clone(),
            spec.workflow.co_guide_policy,
        ));
        let grading = Arc::new(StandardGradingService::new(
            repositories.projects.clone(),
            repositories.applications.clone(),
            repositories.submissions.clone(),
            files,
            event_bus.clone(),
        ));

        Self {
            identity,
            catalog,
            workflow,
            co_guides,
            grading,
            event_bus,
        }
    }
}
