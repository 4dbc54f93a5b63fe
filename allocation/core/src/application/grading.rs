// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Submission & Grading Tracker
//!
//! Reports can only be submitted against a Confirmed application; the
//! ledger is read here but never written.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::domain::capability::{Operation, OwnershipFacts};
use crate::domain::context::RequestContext;
use crate::domain::error::AllocationError;
use crate::domain::events::AllocationEvent;
use crate::domain::files::{FileStore, FileStoreError, Upload};
use crate::domain::ledger::ApplicationStatus;
use crate::domain::project::{Project, ProjectId, SubmissionDetails};
use crate::domain::repository::{ApplicationRepository, ProjectRepository, SubmissionRepository};
use crate::domain::submission::{MarkSheet, Submission};
use crate::domain::user::UserId;
use crate::infrastructure::event_bus::EventBus;

#[async_trait]
pub trait GradingService: Send + Sync {
    /// Overwrites the deadline, full marks and roster.
    async fn set_submission_details(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        details: SubmissionDetails,
        students: Vec<UserId>,
    ) -> Result<Project, AllocationError>;

    async fn submit_report(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        roll_number: &UserId,
        file: Option<Upload>,
    ) -> Result<Submission, AllocationError>;

    async fn record_marks(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        roll_number: &UserId,
        mark: u32,
    ) -> Result<Submission, AllocationError>;

    async fn view_marks(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        roll_number: &UserId,
    ) -> Result<MarkSheet, AllocationError>;

    async fn list_submissions(&self, ctx: &RequestContext, project_id: ProjectId)
        -> Result<Vec<Submission>, AllocationError>;

    async fn download_report(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        roll_number: &UserId,
    ) -> Result<Bytes, AllocationError>;
}

pub struct StandardGradingService {
    projects: Arc<dyn ProjectRepository>,
    applications: Arc<dyn ApplicationRepository>,
    submissions: Arc<dyn SubmissionRepository>,
    files: Arc<dyn FileStore>,
    event_bus: EventBus,
}

impl StandardGradingService {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        applications: Arc<dyn ApplicationRepository>,
        submissions: Arc<dyn SubmissionRepository>,
        files: Arc<dyn FileStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            projects,
            applications,
            submissions,
            files,
            event_bus,
        }
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project, AllocationError> {
        self.projects
            .find_by_id(id)
            .await?
            .ok_or_else(|| AllocationError::not_found("Project"))
    }

    async fn load_submission(&self, project_id: ProjectId, roll_number: &UserId) -> Result<Submission, AllocationError> {
        self.submissions
            .find(project_id, roll_number)
            .await?
            .ok_or_else(|| AllocationError::not_found("Submission"))
    }
}

fn file_error(err: FileStoreError) -> AllocationError {
    match err {
        FileStoreError::NotFound(what) => AllocationError::NotFound(format!("Report file {}", what)),
        FileStoreError::Io(detail) => AllocationError::Storage(detail),
    }
}

#[async_trait]
impl GradingService for StandardGradingService {
    async fn set_submission_details(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        details: SubmissionDetails,
        students: Vec<UserId>,
    ) -> Result<Project, AllocationError> {
        let admitted = Operation::SetSubmissionDetails.admit(ctx)?;
        let mut project = self.load_project(project_id).await?;
        admitted.check(&OwnershipFacts::project(&project.owner))?;
        if details.full_marks == Some(0) {
            return Err(AllocationError::InvalidState("full marks must be greater than zero".to_string()));
        }

        project.set_submission_details(details, students);
        self.projects.save(&project).await?;

        info!(
            project_id = %project.id,
            deadline = ?project.submission.deadline,
            full_marks = ?project.submission.full_marks,
            students = project.students.len(),
            "Submission details set"
        );
        Ok(project)
    }

    async fn submit_report(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        roll_number: &UserId,
        file: Option<Upload>,
    ) -> Result<Submission, AllocationError> {
        let admitted = Operation::SubmitReport.admit(ctx)?;
        admitted.check(&OwnershipFacts {
            roll_number: Some(roll_number),
            ..Default::default()
        })?;
        let project = self.load_project(project_id).await?;

        let confirmed = self
            .applications
            .find_by_student(roll_number)
            .await?
            .iter()
            .any(|a| a.project_id == project.id && a.status() == ApplicationStatus::Confirmed);
        if !confirmed {
            return Err(AllocationError::NotConfirmed);
        }

        let upload = file.filter(|f| !f.is_empty()).ok_or(AllocationError::MissingFile)?;
        let now = Utc::now();
        if project.submission.deadline_passed(now) {
            return Err(AllocationError::InvalidState("the submission deadline has passed".to_string()));
        }

        let file = self.files.store(&upload).await.map_err(file_error)?;
        let submission = match self.submissions.find(project.id, roll_number).await? {
            Some(mut existing) => {
                existing.resubmit(file);
                existing
            }
            None => Submission::new(project.id, roll_number.clone(), file),
        };
        self.submissions.save(&submission).await?;

        info!(project_id = %project.id, roll_number = %roll_number, file = %submission.file, "Report submitted");
        metrics::counter!("btp_reports_submitted_total").increment(1);
        self.event_bus.publish(AllocationEvent::ReportSubmitted {
            project_id: project.id,
            roll_number: roll_number.clone(),
            submitted_at: submission.submitted_at,
        });
        Ok(submission)
    }

    async fn record_marks(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        roll_number: &UserId,
        mark: u32,
    ) -> Result<Submission, AllocationError> {
        let admitted = Operation::RecordMarks.admit(ctx)?;
        let project = self.load_project(project_id).await?;
        admitted.check(&OwnershipFacts::project(&project.owner))?;

        let full_marks = project
            .submission
            .full_marks
            .ok_or_else(|| AllocationError::InvalidState("full marks have not been set".to_string()))?;
        if mark > full_marks {
            return Err(AllocationError::OutOfRange { value: mark, max: full_marks });
        }

        let mut submission = self.load_submission(project.id, roll_number).await?;
        submission.grade(mark);
        self.submissions.save(&submission).await?;

        info!(project_id = %project.id, roll_number = %roll_number, mark, full_marks, "Marks recorded");
        self.event_bus.publish(AllocationEvent::MarksRecorded {
            project_id: project.id,
            roll_number: roll_number.clone(),
            mark,
            recorded_at: Utc::now(),
        });
        Ok(submission)
    }

    async fn view_marks(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        roll_number: &UserId,
    ) -> Result<MarkSheet, AllocationError> {
        let admitted = Operation::ViewMarks.admit(ctx)?;
        let project = self.load_project(project_id).await?;
        admitted.check(&OwnershipFacts {
            project_owner: Some(&project.owner),
            roll_number: Some(roll_number),
            ..Default::default()
        })?;

        let mark = self
            .submissions
            .find(project.id, roll_number)
            .await?
            .and_then(|s| s.mark);
        Ok(MarkSheet {
            project_id: project.id,
            roll_number: roll_number.clone(),
            mark,
            full_marks: project.submission.full_marks,
        })
    }

    async fn list_submissions(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
    ) -> Result<Vec<Submission>, AllocationError> {
        let admitted = Operation::ListSubmissions.admit(ctx)?;
        let project = self.load_project(project_id).await?;
        admitted.check(&OwnershipFacts::project(&project.owner))?;
        Ok(self.submissions.find_by_project(project.id).await?)
    }

    async fn download_report(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        roll_number: &UserId,
    ) -> Result<Bytes, AllocationError> {
        let admitted = Operation::ViewMarks.admit(ctx)?;
        let project = self.load_project(project_id).await?;
        admitted.check(&OwnershipFacts {
            project_owner: Some(&project.owner),
            roll_number: Some(roll_number),
            ..Default::default()
        })?;

        let submission = self.load_submission(project.id, roll_number).await?;
        self.files.fetch(&submission.file).await.map_err(file_error)
    }
}
