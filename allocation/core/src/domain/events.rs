// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::co_guide::ReviewStatus;
use crate::domain::ledger::{ApplicationId, ApplicationStatus};
use crate::domain::project::ProjectId;
use crate::domain::user::UserId;

/// Facts published after a change has been committed.
///
/// Events are emitted only once the repository write succeeded, so a
/// subscriber never observes a change that was rolled back by a conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocationEvent {
    ProjectCreated {
        project_id: ProjectId,
        owner: UserId,
        name: String,
        created_at: DateTime<Utc>,
    },
    ProjectDeleted {
        project_id: ProjectId,
        deleted_by: UserId,
        withdrawn_applications: usize,
        deleted_at: DateTime<Utc>,
    },
    ApplicationSubmitted {
        application_id: ApplicationId,
        project_id: ProjectId,
        student: UserId,
        submitted_at: DateTime<Utc>,
    },
    ApplicationStatusChanged {
        application_id: ApplicationId,
        project_id: ProjectId,
        student: UserId,
        from: ApplicationStatus,
        to: ApplicationStatus,
        changed_by: UserId,
        changed_at: DateTime<Utc>,
    },
    ApplicationDeleted {
        application_id: ApplicationId,
        project_id: ProjectId,
        student: UserId,
        deleted_at: DateTime<Utc>,
    },
    AllocationFinalized {
        application_id: ApplicationId,
        project_id: ProjectId,
        student: UserId,
        finalized_at: DateTime<Utc>,
    },
    CoGuidesDelegated {
        application_id: ApplicationId,
        delegated_by: UserId,
        co_guides: Vec<String>,
        delegated_at: DateTime<Utc>,
    },
    CoGuideResponded {
        application_id: ApplicationId,
        co_guide: UserId,
        review: ReviewStatus,
        responded_at: DateTime<Utc>,
    },
    ReportSubmitted {
        project_id: ProjectId,
        roll_number: UserId,
        submitted_at: DateTime<Utc>,
    },
    MarksRecorded {
        project_id: ProjectId,
        roll_number: UserId,
        mark: u32,
        recorded_at: DateTime<Utc>,
    },
}

impl AllocationEvent {
    /// Project the event concerns, when it names one directly.
    pub fn project_id(&self) -> Option<ProjectId> {
        match self {
            AllocationEvent::ProjectCreated { project_id, .. }
            | AllocationEvent::ProjectDeleted { project_id, .. }
            | AllocationEvent::ApplicationSubmitted { project_id, .. }
            | AllocationEvent::ApplicationStatusChanged { project_id, .. }
            | AllocationEvent::ApplicationDeleted { project_id, .. }
            | AllocationEvent::AllocationFinalized { project_id, .. }
            | AllocationEvent::ReportSubmitted { project_id, .. }
            | AllocationEvent::MarksRecorded { project_id, .. } => Some(*project_id),
            AllocationEvent::CoGuidesDelegated { .. } | AllocationEvent::CoGuideResponded { .. } => None,
        }
    }

    pub fn application_id(&self) -> Option<ApplicationId> {
        match self {
            AllocationEvent::ApplicationSubmitted { application_id, .. }
            | AllocationEvent::ApplicationStatusChanged { application_id, .. }
            | AllocationEvent::ApplicationDeleted { application_id, .. }
            | AllocationEvent::AllocationFinalized { application_id, .. }
            | AllocationEvent::CoGuidesDelegated { application_id, .. }
            | AllocationEvent::CoGuideResponded { application_id, .. } => Some(*application_id),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AllocationEvent::ProjectCreated { .. } => "project_created",
            AllocationEvent::ProjectDeleted { .. } => "project_deleted",
            AllocationEvent::ApplicationSubmitted { .. } => "application_submitted",
            AllocationEvent::ApplicationStatusChanged { .. } => "application_status_changed",
            AllocationEvent::ApplicationDeleted { .. } => "application_deleted",
            AllocationEvent::AllocationFinalized { .. } => "allocation_finalized",
            AllocationEvent::CoGuidesDelegated { .. } => "co_guides_delegated",
            AllocationEvent::CoGuideResponded { .. } => "co_guide_responded",
            AllocationEvent::ReportSubmitted { .. } => "report_submitted",
            AllocationEvent::MarksRecorded { .. } => "marks_recorded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_with_kind() {
        let event = AllocationEvent::ApplicationStatusChanged {
            application_id: ApplicationId::new(),
            project_id: ProjectId::new(),
            student: UserId::new("S1"),
            from: ApplicationStatus::Approved,
            to: ApplicationStatus::TemporarilyConfirmed,
            changed_by: UserId::new("S1"),
            changed_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["to"], "Temporarily Confirmed");
    }
}
