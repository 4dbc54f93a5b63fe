// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Project Catalog

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::application::workflow::WorkflowService;
use crate::domain::capability::{Operation, OwnershipFacts};
use crate::domain::context::RequestContext;
use crate::domain::error::AllocationError;
use crate::domain::events::AllocationEvent;
use crate::domain::files::{FileStore, Upload};
use crate::domain::ledger::ApplicationStatus;
use crate::domain::project::{Project, ProjectId};
use crate::domain::repository::{ApplicationRepository, ProjectRepository, RepositoryError, UserRepository};
use crate::domain::user::{Role, UserId, UserProfile};
use crate::infrastructure::event_bus::EventBus;

/// One row of a [`ProjectListing`].
#[derive(Debug, Clone, Copy)]
pub struct ProjectEntry<'a> {
    pub project: &'a Project,
    /// `None` if the owning account no longer exists.
    pub owner: Option<&'a UserProfile>,
    /// The viewing student's own application status for this project.
    pub viewer_status: Option<ApplicationStatus>,
}

/// Snapshot of the catalog taken for one viewer.
///
/// Iterating builds entries on demand; iterate again to restart.
#[derive(Debug, Clone, Default)]
pub struct ProjectListing {
    projects: Vec<Project>,
    owners: HashMap<UserId, UserProfile>,
    viewer_status: HashMap<ProjectId, ApplicationStatus>,
}

impl ProjectListing {
    pub fn iter(&self) -> ProjectListingIter<'_> {
        ProjectListingIter {
            listing: self,
            projects: self.projects.iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

pub struct ProjectListingIter<'a> {
    listing: &'a ProjectListing,
    projects: std::slice::Iter<'a, Project>,
}

impl<'a> Iterator for ProjectListingIter<'a> {
    type Item = ProjectEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let project = self.projects.next()?;
        Some(ProjectEntry {
            project,
            owner: self.listing.owners.get(&project.owner),
            viewer_status: self.listing.viewer_status.get(&project.id).copied(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.projects.size_hint()
    }
}

impl<'a> IntoIterator for &'a ProjectListing {
    type Item = ProjectEntry<'a>;
    type IntoIter = ProjectListingIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn create_project(
        &self,
        ctx: &RequestContext,
        name: &str,
        file: Option<Upload>,
    ) -> Result<Project, AllocationError>;

    /// Removes the project, then withdraws every open application of it.
    async fn delete_project(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<(), AllocationError>;

    async fn list_projects(&self, ctx: &RequestContext) -> Result<ProjectListing, AllocationError>;

    async fn own_projects(&self, ctx: &RequestContext) -> Result<Vec<Project>, AllocationError>;
}

pub struct StandardCatalogService {
    users: Arc<dyn UserRepository>,
    projects: Arc<dyn ProjectRepository>,
    applications: Arc<dyn ApplicationRepository>,
    files: Arc<dyn FileStore>,
    workflow: Arc<dyn WorkflowService>,
    event_bus: EventBus,
}

impl StandardCatalogService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        projects: Arc<dyn ProjectRepository>,
        applications: Arc<dyn ApplicationRepository>,
        files: Arc<dyn FileStore>,
        workflow: Arc<dyn WorkflowService>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            users,
            projects,
            applications,
            files,
            workflow,
            event_bus,
        }
    }
}

#[async_trait]
impl CatalogService for StandardCatalogService {
    async fn create_project(
        &self,
        ctx: &RequestContext,
        name: &str,
        file: Option<Upload>,
    ) -> Result<Project, AllocationError> {
        let admitted = Operation::CreateProject.admit(ctx)?;
        if name.trim().is_empty() {
            return Err(AllocationError::InvalidState("a project name is required".to_string()));
        }

        // Case-sensitive exact match; surrounding whitespace is not part of the name.
        let name = name.trim().to_string();
        let existing = self.projects.find_by_owner(admitted.user_id()).await?;
        if existing.iter().any(|p| p.name == name) {
            return Err(AllocationError::DuplicateName);
        }

        let file = match file.filter(|f| !f.is_empty()) {
            Some(upload) => Some(
                self.files
                    .store(&upload)
                    .await
                    .map_err(|e| AllocationError::Storage(e.to_string()))?,
            ),
            None => None,
        };

        let project = Project::new(admitted.user_id().clone(), name, file);
        self.projects.insert(&project).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AllocationError::DuplicateName,
            other => other.into(),
        })?;

        info!(project_id = %project.id, owner = %project.owner, name = %project.name, "Project created");
        metrics::counter!("btp_projects_created_total").increment(1);
        self.event_bus.publish(AllocationEvent::ProjectCreated {
            project_id: project.id,
            owner: project.owner.clone(),
            name: project.name.clone(),
            created_at: project.created_at,
        });
        Ok(project)
    }

    async fn delete_project(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<(), AllocationError> {
        let admitted = Operation::DeleteProject.admit(ctx)?;
        let project = self
            .projects
            .find_by_id(project_id)
            .await?
            .ok_or_else(|| AllocationError::not_found("Project"))?;
        admitted.check(&OwnershipFacts::project(&project.owner))?;

        // Remove the row first so a racing apply or confirm sees it gone.
        self.projects.delete(project.id).await?;
        let withdrawn = self.workflow.withdraw_project(ctx, &project).await?;

        info!(project_id = %project.id, by = %admitted.user_id(), withdrawn, "Project deleted");
        self.event_bus.publish(AllocationEvent::ProjectDeleted {
            project_id: project.id,
            deleted_by: admitted.user_id().clone(),
            withdrawn_applications: withdrawn,
            deleted_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_projects(&self, ctx: &RequestContext) -> Result<ProjectListing, AllocationError> {
        let admitted = Operation::ListProjects.admit(ctx)?;
        let projects = self.projects.list_all().await?;

        let mut owners = HashMap::new();
        for project in &projects {
            if owners.contains_key(&project.owner) {
                continue;
            }
            if let Some(user) = self.users.find_by_id(&project.owner).await? {
                owners.insert(project.owner.clone(), user.profile());
            }
        }

        // Oldest first, so a later attempt at the same project wins.
        let mut viewer_status = HashMap::new();
        if admitted.role() == Role::Student {
            for application in self.applications.find_by_student(admitted.user_id()).await? {
                viewer_status.insert(application.project_id, application.status());
            }
        }

        Ok(ProjectListing {
            projects,
            owners,
            viewer_status,
        })
    }

    async fn own_projects(&self, ctx: &RequestContext) -> Result<Vec<Project>, AllocationError> {
        let admitted = Operation::ViewOwnProjects.admit(ctx)?;
        Ok(self.projects.find_by_owner(admitted.user_id()).await?)
    }
}
