// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end allocation scenarios over the in-memory repositories.
//!
//! Every test wires the full service graph the way `btp serve` does, with a
//! recording mail sender so outbound notifications can be asserted on.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Barrier;

use btp_allocation_core::application::{Repositories, Services};
use btp_allocation_core::co_guide::{CoGuidePolicy, CoGuideSelection, ReviewStatus};
use btp_allocation_core::config::AllocationConfigSpec;
use btp_allocation_core::context::{Principal, RequestContext};
use btp_allocation_core::error::AllocationError;
use btp_allocation_core::events::AllocationEvent;
use btp_allocation_core::files::Upload;
use btp_allocation_core::infrastructure::event_bus::EventBus;
use btp_allocation_core::infrastructure::files::InMemoryFileStore;
use btp_allocation_core::infrastructure::mail::RecordingNotificationSender;
use btp_allocation_core::ledger::{Application, ApplicationId, ApplicationStatus, StatusAction};
use btp_allocation_core::project::{Project, ProjectId, SubmissionDetails};
use btp_allocation_core::repository::{ApplicationRepository, ProjectRepository, RepositoryError};
use btp_allocation_core::user::{NewUser, Role, UserId};

struct Harness {
    services: Services,
    repositories: Repositories,
    mail: Arc<RecordingNotificationSender>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_spec(AllocationConfigSpec::default()).await
    }

    async fn with_spec(spec: AllocationConfigSpec) -> Self {
        Self::with_repositories(spec, Repositories::in_memory()).await
    }

    async fn with_repositories(spec: AllocationConfigSpec, repositories: Repositories) -> Self {
        let mail = Arc::new(RecordingNotificationSender::new());
        let services = Services::new(
            &repositories,
            Arc::new(InMemoryFileStore::new()),
            mail.clone(),
            EventBus::new(256),
            &spec,
        );

        let system = RequestContext::system();
        let accounts = [
            ("F", Role::Faculty),
            ("G", Role::Faculty),
            ("H", Role::Faculty),
            ("S", Role::Student),
            ("T", Role::Student),
        ];
        for (id, role) in accounts {
            services
                .identity
                .provision_user(
                    &system,
                    NewUser {
                        id: UserId::new(id),
                        role,
                        full_name: format!("{} Example", id),
                        email: format!("{}@uni.example", id.to_lowercase()),
                        department: "CSE".to_string(),
                        password: "secret".to_string(),
                    },
                )
                .await
                .unwrap();
        }

        Self {
            services,
            repositories,
            mail,
        }
    }

    async fn project(&self, owner: &str, name: &str) -> ProjectId {
        self.services
            .catalog
            .create_project(&as_faculty(owner), name, None)
            .await
            .unwrap()
            .id
    }

    async fn status_of(&self, student: &str, project: ProjectId) -> Vec<ApplicationStatus> {
        self.repositories
            .applications
            .find_by_student(&UserId::new(student))
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.project_id == project)
            .map(|a| a.status())
            .collect()
    }
}

/// Deletes one project right after it is read, as a delete landing between
/// another request's read and write would.
struct VanishingProjects {
    inner: Arc<dyn ProjectRepository>,
    vanish: Mutex<Option<ProjectId>>,
}

impl VanishingProjects {
    fn wrap(repositories: &mut Repositories) -> Arc<Self> {
        let wrapper = Arc::new(Self {
            inner: repositories.projects.clone(),
            vanish: Mutex::new(None),
        });
        repositories.projects = wrapper.clone();
        wrapper
    }

    fn vanish_after_next_read(&self, project: ProjectId) {
        *self.vanish.lock() = Some(project);
    }
}

#[async_trait]
impl ProjectRepository for VanishingProjects {
    async fn insert(&self, project: &Project) -> Result<(), RepositoryError> {
        self.inner.insert(project).await
    }

    async fn save(&self, project: &Project) -> Result<(), RepositoryError> {
        self.inner.save(project).await
    }

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, RepositoryError> {
        let found = self.inner.find_by_id(id).await?;
        let armed = {
            let mut vanish = self.vanish.lock();
            if *vanish == Some(id) {
                vanish.take()
            } else {
                None
            }
        };
        if armed.is_some() {
            self.inner.delete(id).await?;
        }
        Ok(found)
    }

    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Project>, RepositoryError> {
        self.inner.find_by_owner(owner).await
    }

    async fn list_all(&self) -> Result<Vec<Project>, RepositoryError> {
        self.inner.list_all().await
    }

    async fn delete(&self, id: ProjectId) -> Result<(), RepositoryError> {
        self.inner.delete(id).await
    }
}

/// Holds every batch write at a barrier once armed, so racing writers all
/// commit against the versions they read.
struct RacingApplications {
    inner: Arc<dyn ApplicationRepository>,
    gate: Mutex<Option<Arc<Barrier>>>,
}

impl RacingApplications {
    fn wrap(repositories: &mut Repositories) -> Arc<Self> {
        let wrapper = Arc::new(Self {
            inner: repositories.applications.clone(),
            gate: Mutex::new(None),
        });
        repositories.applications = wrapper.clone();
        wrapper
    }

    fn arm(&self, writers: usize) {
        *self.gate.lock() = Some(Arc::new(Barrier::new(writers)));
    }

    fn disarm(&self) {
        self.gate.lock().take();
    }
}

#[async_trait]
impl ApplicationRepository for RacingApplications {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError> {
        self.inner.insert(application).await
    }

    async fn update_many(&self, applications: &[Application]) -> Result<(), RepositoryError> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }
        self.inner.update_many(applications).await
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_student(&self, student: &UserId) -> Result<Vec<Application>, RepositoryError> {
        self.inner.find_by_student(student).await
    }

    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Application>, RepositoryError> {
        self.inner.find_by_project(project).await
    }

    async fn find_by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>, RepositoryError> {
        self.inner.find_by_status(status).await
    }

    async fn delete(&self, id: ApplicationId, expected_version: u64) -> Result<(), RepositoryError> {
        self.inner.delete(id, expected_version).await
    }
}

fn as_faculty(id: &str) -> RequestContext {
    RequestContext::authenticated(Principal::new(id, Role::Faculty))
}

fn as_student(id: &str) -> RequestContext {
    RequestContext::authenticated(Principal::new(id, Role::Student))
}

fn as_admin(id: &str) -> RequestContext {
    RequestContext::authenticated(Principal::new(id, Role::Admin))
}

fn after_window() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::hours(25)
}

#[tokio::test]
async fn test_duplicate_project_name_per_owner() {
    let h = Harness::new().await;
    h.project("F", "P1").await;

    let err = h
        .services
        .catalog
        .create_project(&as_faculty("F"), "P1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::DuplicateName));

    // Another faculty may reuse the name.
    h.project("G", "P1").await;
}

#[tokio::test]
async fn test_reapply_after_rejection() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;

    let first = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();
    assert_eq!(first.status(), ApplicationStatus::Approved);

    let status = h
        .services
        .workflow
        .set_status(&as_faculty("F"), first.id, StatusAction::Reject)
        .await
        .unwrap();
    assert_eq!(status, ApplicationStatus::Rejected);
    assert_eq!(h.mail.sent_to("s@uni.example").len(), 1);

    let second = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.status(), ApplicationStatus::Approved);
    assert_eq!(
        h.status_of("S", p1).await.len(),
        2,
        "the rejected record is kept alongside the new one"
    );

    let err = h.services.workflow.apply(&as_student("S"), p1).await.unwrap_err();
    assert!(matches!(err, AllocationError::AlreadyApplied));
}

#[tokio::test]
async fn test_set_status_is_idempotent() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let application = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();

    let status = h
        .services
        .workflow
        .set_status(&as_faculty("F"), application.id, StatusAction::Approve)
        .await
        .unwrap();
    assert_eq!(status, ApplicationStatus::Approved);
    assert!(h.mail.sent_to("s@uni.example").is_empty(), "approving an approved application is a no-op");

    for _ in 0..2 {
        let status = h
            .services
            .workflow
            .set_status(&as_faculty("F"), application.id, StatusAction::Reject)
            .await
            .unwrap();
        assert_eq!(status, ApplicationStatus::Rejected);
    }
    assert_eq!(h.mail.sent_to("s@uni.example").len(), 1, "a repeated action sends no mail");

    let err = h
        .services
        .workflow
        .set_status(&as_faculty("F"), application.id, StatusAction::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InvalidState(_)));
}

#[tokio::test]
async fn test_second_confirm_demotes_first() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let p2 = h.project("G", "P2").await;
    let student = as_student("S");
    h.services.workflow.apply(&student, p1).await.unwrap();
    h.services.workflow.apply(&student, p2).await.unwrap();

    h.services.workflow.confirm(&student, p1).await.unwrap();
    h.services.workflow.confirm(&student, p2).await.unwrap();

    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Approved]);
    assert_eq!(h.status_of("S", p2).await, vec![ApplicationStatus::TemporarilyConfirmed]);

    let err = h.services.workflow.confirm(&student, p2).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotEligible(_)));
}

#[tokio::test]
async fn test_confirm_requires_open_application() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let application = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();
    h.services
        .workflow
        .set_status(&as_faculty("F"), application.id, StatusAction::Reject)
        .await
        .unwrap();

    let err = h.services.workflow.confirm(&as_student("S"), p1).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotEligible(_)));

    let p2 = h.project("F", "P2").await;
    let err = h.services.workflow.confirm(&as_student("S"), p2).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotEligible(_)), "never applied");
}

#[tokio::test]
async fn test_non_owner_cannot_set_status() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let application = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();

    let err = h
        .services
        .workflow
        .set_status(&as_faculty("G"), application.id, StatusAction::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unauthorized));
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Approved]);
}

#[tokio::test]
async fn test_report_requires_confirmed_allocation() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let p2 = h.project("G", "P2").await;
    let s = as_student("S");
    let t = as_student("T");

    h.services.workflow.apply(&s, p1).await.unwrap();
    h.services.workflow.confirm(&s, p1).await.unwrap();
    h.services.workflow.apply(&t, p2).await.unwrap();

    let summary = h
        .services
        .workflow
        .finalize_confirmations(&RequestContext::system(), after_window())
        .await
        .unwrap();
    assert_eq!(summary.confirmed.len(), 1);

    let submission = h
        .services
        .grading
        .submit_report(&s, p1, &UserId::new("S"), Some(Upload::new("report.pdf", "pdf bytes")))
        .await
        .unwrap();
    assert_eq!(submission.roll_number, UserId::new("S"));

    let err = h
        .services
        .grading
        .submit_report(&t, p2, &UserId::new("T"), Some(Upload::new("report.pdf", "pdf bytes")))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::NotConfirmed));

    let err = h
        .services
        .grading
        .submit_report(&s, p1, &UserId::new("T"), Some(Upload::new("report.pdf", "pdf bytes")))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unauthorized | AllocationError::Forbidden(_)));

    let err = h
        .services
        .grading
        .submit_report(&s, p1, &UserId::new("S"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::MissingFile));
}

#[tokio::test]
async fn test_finalize_sweep_promotes_and_closes_others() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let p2 = h.project("G", "P2").await;
    let p3 = h.project("H", "P3").await;
    let s = as_student("S");
    let mut events = h.services.event_bus.subscribe();

    h.services.workflow.apply(&s, p1).await.unwrap();
    h.services.workflow.apply(&s, p2).await.unwrap();
    h.services.workflow.apply(&s, p3).await.unwrap();
    h.services.workflow.confirm(&s, p1).await.unwrap();

    let early = h
        .services
        .workflow
        .finalize_confirmations(&RequestContext::system(), Utc::now())
        .await
        .unwrap();
    assert!(early.confirmed.is_empty());
    assert_eq!(early.waiting, 1);

    let summary = h
        .services
        .workflow
        .finalize_confirmations(&RequestContext::system(), after_window())
        .await
        .unwrap();
    assert_eq!(summary.confirmed.len(), 1);
    assert_eq!(summary.rejected, 2);
    assert!(summary.conflicts.is_empty());

    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Confirmed]);
    assert_eq!(h.status_of("S", p2).await, vec![ApplicationStatus::Rejected]);
    assert_eq!(h.status_of("S", p3).await, vec![ApplicationStatus::Rejected]);

    let project = h.repositories.projects.find_by_id(p1).await.unwrap().unwrap();
    assert_eq!(project.students, vec![UserId::new("S")]);
    assert!(h
        .mail
        .sent_to("f@uni.example")
        .iter()
        .any(|m| m.subject == "BTP allocation confirmed"));

    let mut finalized = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AllocationEvent::AllocationFinalized { .. }) {
            finalized += 1;
        }
    }
    assert_eq!(finalized, 1);

    // A confirmed student is done applying.
    let p4 = h.project("F", "P4").await;
    let err = h.services.workflow.apply(&s, p4).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotEligible(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_confirms_leave_one_choice() {
    let mut repositories = Repositories::in_memory();
    let racing = RacingApplications::wrap(&mut repositories);
    let h = Harness::with_repositories(AllocationConfigSpec::default(), repositories).await;
    let p1 = h.project("F", "P1").await;
    let p2 = h.project("G", "P2").await;
    let s = as_student("S");
    h.services.workflow.apply(&s, p1).await.unwrap();
    h.services.workflow.apply(&s, p2).await.unwrap();

    racing.arm(2);
    let handles: Vec<_> = [p1, p2]
        .into_iter()
        .map(|project| {
            let services = h.services.clone();
            tokio::spawn(async move { services.workflow.confirm(&as_student("S"), project).await })
        })
        .collect();
    let mut won = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(status) => {
                assert_eq!(status, ApplicationStatus::TemporarilyConfirmed);
                won += 1;
            }
            Err(AllocationError::Conflict) => conflicts += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    racing.disarm();
    assert_eq!((won, conflicts), (1, 1));

    let chosen = h
        .repositories
        .applications
        .find_by_student(&UserId::new("S"))
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.status() == ApplicationStatus::TemporarilyConfirmed)
        .count();
    assert_eq!(chosen, 1);

    // The loser can simply retry.
    h.services.workflow.confirm(&s, p1).await.unwrap();
    h.services.workflow.confirm(&s, p2).await.unwrap();
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Approved]);
    assert_eq!(h.status_of("S", p2).await, vec![ApplicationStatus::TemporarilyConfirmed]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_decisions_commit_once() {
    let mut repositories = Repositories::in_memory();
    let racing = RacingApplications::wrap(&mut repositories);
    let h = Harness::with_repositories(AllocationConfigSpec::default(), repositories).await;
    let p1 = h.project("F", "P1").await;
    let application = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();
    h.services
        .co_guides
        .delegate(&as_faculty("F"), application.id, CoGuideSelection::from_values(["G"]).unwrap())
        .await
        .unwrap();
    let mail_before = h.mail.sent_to("s@uni.example").len();

    racing.arm(2);
    let handles: Vec<_> = ["F", "G"]
        .into_iter()
        .map(|faculty| {
            let services = h.services.clone();
            tokio::spawn(async move {
                services
                    .workflow
                    .set_status(&as_faculty(faculty), application.id, StatusAction::Reject)
                    .await
            })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    racing.disarm();

    assert_eq!(results.iter().filter(|r| matches!(r, Ok(ApplicationStatus::Rejected))).count(), 1);
    assert_eq!(results.iter().filter(|r| matches!(r, Err(AllocationError::Conflict))).count(), 1);
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Rejected]);
    assert_eq!(h.mail.sent_to("s@uni.example").len(), mail_before + 1);
}

#[tokio::test]
async fn test_apply_racing_project_delete_is_closed() {
    let mut repositories = Repositories::in_memory();
    let vanishing = VanishingProjects::wrap(&mut repositories);
    let h = Harness::with_repositories(AllocationConfigSpec::default(), repositories).await;
    let p1 = h.project("F", "P1").await;

    // The delete lands after apply has read the project but before it writes.
    vanishing.vanish_after_next_read(p1);
    let err = h.services.workflow.apply(&as_student("S"), p1).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(_)));
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Rejected]);

    let err = h.services.workflow.apply(&as_student("S"), p1).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(_)));
}

#[tokio::test]
async fn test_confirm_and_finalize_refuse_deleted_project() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let p2 = h.project("G", "P2").await;
    let project = h.repositories.projects.find_by_id(p1).await.unwrap().unwrap();

    // Withdrawal finds nothing, an apply slips in, then the row goes.
    let withdrawn = h.services.workflow.withdraw_project(&as_faculty("F"), &project).await.unwrap();
    assert_eq!(withdrawn, 0);
    h.services.workflow.apply(&as_student("S"), p1).await.unwrap();
    h.repositories.projects.delete(p1).await.unwrap();

    let err = h.services.workflow.confirm(&as_student("S"), p1).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(_)));

    // A choice already made when the project disappears is closed by the sweep.
    let chosen = h.services.workflow.apply(&as_student("T"), p2).await.unwrap();
    h.services.workflow.confirm(&as_student("T"), p2).await.unwrap();
    h.repositories.projects.delete(p2).await.unwrap();

    let summary = h
        .services
        .workflow
        .finalize_confirmations(&RequestContext::system(), Utc::now() + Duration::days(30))
        .await
        .unwrap();
    assert!(summary.confirmed.is_empty());
    assert_eq!(summary.orphaned, vec![chosen.id]);
    assert_eq!(h.status_of("T", p2).await, vec![ApplicationStatus::Rejected]);
    assert!(h.mail.sent_to("t@uni.example").iter().all(|m| m.subject != "BTP allocation confirmed"));

    // T is free to take another project.
    let p3 = h.project("H", "P3").await;
    h.services.workflow.apply(&as_student("T"), p3).await.unwrap();
}

#[tokio::test]
async fn test_admin_may_delete_any_project() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    h.services.workflow.apply(&as_student("S"), p1).await.unwrap();

    h.services.catalog.delete_project(&as_admin("A"), p1).await.unwrap();
    assert!(h.repositories.projects.find_by_id(p1).await.unwrap().is_none());
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Rejected]);
}

#[tokio::test]
async fn test_any_delegation_lets_every_other_faculty_decide() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let application = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();

    let err = h
        .services
        .workflow
        .set_status(&as_faculty("H"), application.id, StatusAction::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unauthorized));

    h.services
        .co_guides
        .delegate(&as_faculty("F"), application.id, CoGuideSelection::Any)
        .await
        .unwrap();
    h.services
        .workflow
        .set_status(&as_faculty("H"), application.id, StatusAction::Reject)
        .await
        .unwrap();
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Rejected]);
}

#[tokio::test]
async fn test_co_guide_any_approve() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let application = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();

    let selection = CoGuideSelection::from_values(["G", "H"]).unwrap();
    h.services
        .co_guides
        .delegate(&as_faculty("F"), application.id, selection.clone())
        .await
        .unwrap();
    assert_eq!(h.mail.sent_to("g@uni.example").len(), 1);

    let viewed = h
        .services
        .co_guides
        .view_selected(&as_student("S"), application.id)
        .await
        .unwrap();
    assert_eq!(viewed, Some(selection));

    let inbox = h.services.co_guides.inbox(&as_faculty("H")).await.unwrap();
    assert_eq!(inbox.len(), 1);

    // A rejection is recorded but leaves the application open.
    let response = h
        .services
        .co_guides
        .respond(&as_faculty("G"), application.id, StatusAction::Reject)
        .await
        .unwrap();
    assert!(!response.approved_application);
    assert_eq!(response.application_status, ApplicationStatus::Approved);
    let inbox = h.services.co_guides.inbox(&as_faculty("G")).await.unwrap();
    assert_eq!(inbox[0].my_review, ReviewStatus::Rejected);

    let response = h
        .services
        .co_guides
        .respond(&as_faculty("H"), application.id, StatusAction::Approve)
        .await
        .unwrap();
    assert!(response.approved_application);
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Approved]);

    // An invited co-guide may also decide the application directly.
    h.services
        .workflow
        .set_status(&as_faculty("G"), application.id, StatusAction::Reject)
        .await
        .unwrap();
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Rejected]);

    // The rejection closed the delegation.
    let err = h
        .services
        .co_guides
        .respond(&as_faculty("H"), application.id, StatusAction::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::NotInvited));
}

#[tokio::test]
async fn test_co_guide_all_must_approve() {
    let mut spec = AllocationConfigSpec::default();
    spec.workflow.co_guide_policy = CoGuidePolicy::AllMustApprove;
    let h = Harness::with_spec(spec).await;
    let p1 = h.project("F", "P1").await;
    let application = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();
    h.services
        .co_guides
        .delegate(&as_faculty("F"), application.id, CoGuideSelection::from_values(["G", "H"]).unwrap())
        .await
        .unwrap();

    let first = h
        .services
        .co_guides
        .respond(&as_faculty("G"), application.id, StatusAction::Approve)
        .await
        .unwrap();
    assert!(!first.approved_application);

    let second = h
        .services
        .co_guides
        .respond(&as_faculty("H"), application.id, StatusAction::Approve)
        .await
        .unwrap();
    assert!(second.approved_application);
    assert_eq!(second.application_status, ApplicationStatus::Approved);
}

#[tokio::test]
async fn test_co_guide_any_sentinel_and_uninvited() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let application = h.services.workflow.apply(&as_student("S"), p1).await.unwrap();

    h.services
        .co_guides
        .delegate(&as_faculty("F"), application.id, CoGuideSelection::from_values(["any"]).unwrap())
        .await
        .unwrap();
    let viewed = h
        .services
        .co_guides
        .view_selected(&as_faculty("F"), application.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(viewed.to_values(), vec!["any".to_string()]);

    // "any" admits every faculty member except the owner.
    let inbox = h.services.co_guides.inbox(&as_faculty("G")).await.unwrap();
    assert_eq!(inbox.len(), 1);
    let err = h
        .services
        .co_guides
        .respond(&as_faculty("F"), application.id, StatusAction::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::NotInvited));

    let err = h
        .services
        .co_guides
        .delegate(&as_faculty("F"), application.id, CoGuideSelection::from_values(["F"]).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InvalidState(_)));
}

#[tokio::test]
async fn test_marks_bounded_by_full_marks() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let s = as_student("S");
    let f = as_faculty("F");
    h.services.workflow.apply(&s, p1).await.unwrap();
    h.services.workflow.confirm(&s, p1).await.unwrap();
    h.services
        .workflow
        .finalize_confirmations(&RequestContext::system(), after_window())
        .await
        .unwrap();

    let roll = UserId::new("S");
    let err = h.services.grading.record_marks(&f, p1, &roll, 10).await.unwrap_err();
    assert!(matches!(err, AllocationError::InvalidState(_)), "full marks not set yet");

    h.services
        .grading
        .set_submission_details(
            &f,
            p1,
            SubmissionDetails {
                deadline: Some(Utc::now() + Duration::days(7)),
                full_marks: Some(100),
            },
            vec![roll.clone()],
        )
        .await
        .unwrap();

    let err = h.services.grading.record_marks(&f, p1, &roll, 50).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(_)), "nothing submitted yet");

    h.services
        .grading
        .submit_report(&s, p1, &roll, Some(Upload::new("report.pdf", Bytes::from_static(b"%PDF"))))
        .await
        .unwrap();

    let err = h.services.grading.record_marks(&f, p1, &roll, 101).await.unwrap_err();
    assert!(matches!(err, AllocationError::OutOfRange { value: 101, max: 100 }));

    let graded = h.services.grading.record_marks(&f, p1, &roll, 100).await.unwrap();
    assert_eq!(graded.mark, Some(100));

    // Grading again overwrites.
    let regraded = h.services.grading.record_marks(&f, p1, &roll, 40).await.unwrap();
    assert_eq!(regraded.mark, Some(40));
    let sheet = h.services.grading.view_marks(&f, p1, &roll).await.unwrap();
    assert_eq!(sheet.mark, Some(40));
    h.services.grading.record_marks(&f, p1, &roll, 100).await.unwrap();

    let err = h
        .services
        .grading
        .view_marks(&as_faculty("G"), p1, &roll)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unauthorized));

    let sheet = h.services.grading.view_marks(&s, p1, &roll).await.unwrap();
    assert_eq!(sheet.mark, Some(100));
    assert_eq!(sheet.full_marks, Some(100));

    let report = h.services.grading.download_report(&f, p1, &roll).await.unwrap();
    assert_eq!(&report[..], b"%PDF");

    let err = h
        .services
        .grading
        .view_marks(&as_student("T"), p1, &roll)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unauthorized | AllocationError::Forbidden(_)));
}

#[tokio::test]
async fn test_submission_after_deadline_is_refused() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let s = as_student("S");
    h.services.workflow.apply(&s, p1).await.unwrap();
    h.services.workflow.confirm(&s, p1).await.unwrap();
    h.services
        .workflow
        .finalize_confirmations(&RequestContext::system(), after_window())
        .await
        .unwrap();
    h.services
        .grading
        .set_submission_details(
            &as_faculty("F"),
            p1,
            SubmissionDetails {
                deadline: Some(Utc::now() - Duration::minutes(1)),
                full_marks: Some(50),
            },
            Vec::new(),
        )
        .await
        .unwrap();

    let err = h
        .services
        .grading
        .submit_report(&s, p1, &UserId::new("S"), Some(Upload::new("late.pdf", "late")))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InvalidState(_)));
}

#[tokio::test]
async fn test_delete_project_withdraws_applications() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    h.services.workflow.apply(&as_student("S"), p1).await.unwrap();
    h.services.workflow.apply(&as_student("T"), p1).await.unwrap();

    let err = h
        .services
        .catalog
        .delete_project(&as_faculty("G"), p1)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unauthorized));

    h.services.catalog.delete_project(&as_faculty("F"), p1).await.unwrap();
    assert!(h.repositories.projects.find_by_id(p1).await.unwrap().is_none());
    assert_eq!(h.status_of("S", p1).await, vec![ApplicationStatus::Rejected]);
    assert_eq!(h.status_of("T", p1).await, vec![ApplicationStatus::Rejected]);

    let mine = h.services.workflow.student_applications(&as_student("S")).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(mine[0].project_name.is_none());
}

#[tokio::test]
async fn test_student_may_withdraw_open_application_only() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    let p2 = h.project("G", "P2").await;
    let s = as_student("S");
    let open = h.services.workflow.apply(&s, p1).await.unwrap();
    h.services.workflow.apply(&s, p2).await.unwrap();
    h.services.workflow.confirm(&s, p2).await.unwrap();

    let err = h
        .services
        .workflow
        .delete_application(&as_student("T"), open.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Unauthorized));

    h.services.workflow.delete_application(&s, open.id).await.unwrap();
    assert!(h.status_of("S", p1).await.is_empty());

    let chosen = h
        .repositories
        .applications
        .find_by_student(&UserId::new("S"))
        .await
        .unwrap()
        .remove(0);
    let err = h.services.workflow.delete_application(&s, chosen.id).await.unwrap_err();
    assert!(matches!(err, AllocationError::Unauthorized));
}

#[tokio::test]
async fn test_listing_shows_viewer_status() {
    let h = Harness::new().await;
    let p1 = h.project("F", "P1").await;
    h.project("G", "P2").await;
    h.services.workflow.apply(&as_student("S"), p1).await.unwrap();

    let listing = h.services.catalog.list_projects(&as_student("S")).await.unwrap();
    assert_eq!(listing.len(), 2);
    for entry in &listing {
        if entry.project.id == p1 {
            assert_eq!(entry.viewer_status, Some(ApplicationStatus::Approved));
            assert_eq!(entry.owner.map(|o| o.id.clone()), Some(UserId::new("F")));
        } else {
            assert_eq!(entry.viewer_status, None);
        }
    }

    let faculty_view = h.services.catalog.list_projects(&as_faculty("G")).await.unwrap();
    assert!(faculty_view.iter().all(|entry| entry.viewer_status.is_none()));
}
