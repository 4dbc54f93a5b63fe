// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Report submissions and marks for confirmed projects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::files::FileRef;
use crate::domain::project::ProjectId;
use crate::domain::user::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub project_id: ProjectId,
    pub roll_number: UserId,
    pub file: FileRef,
    pub mark: Option<u32>,
    pub submitted_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn new(project_id: ProjectId, roll_number: UserId, file: FileRef) -> Self {
        Self {
            project_id,
            roll_number,
            file,
            mark: None,
            submitted_at: Utc::now(),
            graded_at: None,
        }
    }

    /// Replace the uploaded report. A mark already recorded is kept.
    pub fn resubmit(&mut self, file: FileRef) {
        self.file = file;
        self.submitted_at = Utc::now();
    }

    pub fn grade(&mut self, mark: u32) {
        self.mark = Some(mark);
        self.graded_at = Some(Utc::now());
    }
}

/// What a viewer sees for one student's marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSheet {
    pub project_id: ProjectId,
    pub roll_number: UserId,
    pub mark: Option<u32>,
    pub full_marks: Option<u32>,
}
