// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Project Catalog Aggregate
//!
//! A `Project` is posted by its owning faculty. Names are unique within one
//! faculty's postings (exact, case-sensitive match); two different faculty
//! may both post "Compiler Construction".
//!
//! Submission details (deadline, full marks) and the ordered list of
//! confirmed students are attached to the project once allocation is under
//! way; see [`crate::application::grading`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::files::FileRef;
use crate::domain::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Deadline and grading scale for report submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDetails {
    pub deadline: Option<DateTime<Utc>>,
    pub full_marks: Option<u32>,
}

impl SubmissionDetails {
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.deadline, Some(deadline) if now > deadline)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub owner: UserId,
    pub file: Option<FileRef>,
    pub submission: SubmissionDetails,
    /// Confirmed students, in confirmation order.
    pub students: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(owner: UserId, name: String, file: Option<FileRef>) -> Self {
        Self {
            id: ProjectId::new(),
            name,
            owner,
            file,
            submission: SubmissionDetails::default(),
            students: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }

    /// Overwrite the submission details and the student roster.
    pub fn set_submission_details(&mut self, details: SubmissionDetails, students: Vec<UserId>) {
        self.submission = details;
        self.students = dedup_preserving_order(students);
    }

    /// Append a confirmed student unless already listed.
    pub fn add_student(&mut self, student: UserId) -> bool {
        if self.students.contains(&student) {
            return false;
        }
        self.students.push(student);
        true
    }
}

fn dedup_preserving_order(ids: Vec<UserId>) -> Vec<UserId> {
    let mut out: Vec<UserId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_add_student_keeps_order_and_skips_duplicates() {
        let mut project = Project::new(UserId::new("F1"), "P1".to_string(), None);
        assert!(project.add_student(UserId::new("S2")));
        assert!(project.add_student(UserId::new("S1")));
        assert!(!project.add_student(UserId::new("S2")));
        assert_eq!(project.students, vec![UserId::new("S2"), UserId::new("S1")]);
    }

    #[test]
    fn test_set_submission_details_overwrites_roster() {
        let mut project = Project::new(UserId::new("F1"), "P1".to_string(), None);
        project.add_student(UserId::new("S9"));
        project.set_submission_details(
            SubmissionDetails { deadline: None, full_marks: Some(100) },
            vec![UserId::new("S1"), UserId::new("S2"), UserId::new("S1")],
        );
        assert_eq!(project.students, vec![UserId::new("S1"), UserId::new("S2")]);
        assert_eq!(project.submission.full_marks, Some(100));
    }

    #[test]
    fn test_deadline_passed() {
        let now = Utc::now();
        let details = SubmissionDetails { deadline: Some(now), full_marks: None };
        assert!(!details.deadline_passed(now));
        assert!(details.deadline_passed(now + Duration::seconds(1)));
        assert!(!SubmissionDetails::default().deadline_passed(now));
    }
}
