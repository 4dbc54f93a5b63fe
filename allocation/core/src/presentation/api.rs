// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{multipart::{MultipartError, MultipartRejection}, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::Services;
use crate::domain::co_guide::CoGuideSelection;
use crate::domain::context::{RequestContext, SessionToken};
use crate::domain::error::AllocationError;
use crate::domain::files::Upload;
use crate::domain::ledger::{ApplicationId, ApplicationStatus, StatusAction};
use crate::domain::project::{Project, ProjectId, SubmissionDetails};
use crate::domain::user::{NewUser, Role, UserId, UserProfile};

pub const SESSION_COOKIE: &str = "btp_session";

pub struct AppState {
    pub services: Services,
    pub start_time: Instant,
}

pub fn router(services: Services) -> Router {
    let state = Arc::new(AppState {
        services,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/signup", post(signup))
        .route("/signup/verify", post(verify_signup))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset", post(reset_password))
        .route("/profile", get(profile))
        .route("/faculty", get(faculty))
        .route("/users", get(list_users).post(provision_user))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/mine", get(own_projects))
        .route("/projects/{id}", delete(delete_project))
        .route("/projects/{id}/submission", put(set_submission_details))
        .route("/projects/{id}/reports/{roll}", post(submit_report).get(download_report))
        .route("/projects/{id}/submissions", get(list_submissions))
        .route("/projects/{id}/marks/{roll}", put(record_marks).get(view_marks))
        .route("/applications", get(faculty_applications).post(apply))
        .route("/applications/mine", get(student_applications))
        .route("/applications/{id}", delete(delete_application))
        .route("/applications/{id}/status", post(set_status))
        .route("/applications/{id}/co-guides", get(view_co_guides).post(delegate))
        .route("/applications/{id}/co-guides/respond", post(respond_co_guide))
        .route("/co-guide/inbox", get(co_guide_inbox))
        .route("/confirmations", post(confirm))
        .route("/confirmations/finalize", post(finalize))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub struct ApiError(AllocationError);

impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, message) = match &err {
            AllocationError::Unauthenticated => return Redirect::to("/login").into_response(),
            AllocationError::Unauthorized | AllocationError::Forbidden(_) => {
                (StatusCode::FORBIDDEN, "Unauthorized access.".to_string())
            }
            AllocationError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
            AllocationError::Conflict => (StatusCode::CONFLICT, err.to_string()),
            AllocationError::Storage(detail) => {
                tracing::error!(error = %detail, "Request failed on storage");
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong. Please try again.".to_string())
            }
            AllocationError::InvalidState(_)
            | AllocationError::DuplicateName
            | AllocationError::AlreadyApplied
            | AllocationError::NotEligible(_)
            | AllocationError::NotConfirmed
            | AllocationError::OutOfRange { .. }
            | AllocationError::MissingFile
            | AllocationError::NotInvited => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        };
        (status, Json(json!({ "error": message, "code": err.code() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Session resolution
// ---------------------------------------------------------------------------

fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(token) = bearer {
        return Some(SessionToken(token.to_string()));
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| SessionToken(value.to_string()))
}

async fn context(state: &AppState, headers: &HeaderMap) -> ApiResult<RequestContext> {
    let token = session_token(headers);
    let identity = state.services.identity.resolve_session(token.as_ref()).await?;
    Ok(RequestContext::new(identity))
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub id: String,
    pub password: String,
}

async fn login(State(state): State<Arc<AppState>>, Json(body): Json<LoginRequest>) -> ApiResult<Response> {
    let token = state.services.identity.login(&UserId::new(body.id), &body.password).await?;
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token);
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "token": token.0 }))).into_response())
}

async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(token) = session_token(&headers) {
        state.services.identity.logout(&token).await?;
    }
    let cookie = format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE);
    Ok(([(header::SET_COOKIE, cookie)], StatusCode::NO_CONTENT).into_response())
}

async fn signup(State(state): State<Arc<AppState>>, Json(body): Json<NewUser>) -> ApiResult<StatusCode> {
    state.services.identity.begin_signup(body).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

async fn verify_signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let profile = state.services.identity.verify_signup(&body.email, &body.code).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[derive(Deserialize)]
pub struct ForgotRequest {
    pub email: String,
}

async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForgotRequest>,
) -> ApiResult<StatusCode> {
    state.services.identity.begin_password_reset(&body.email).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub email: String,
    pub code: String,
    pub password: String,
}

async fn reset_password(State(state): State<Arc<AppState>>, Json(body): Json<ResetRequest>) -> ApiResult<StatusCode> {
    state
        .services
        .identity
        .reset_password(&body.email, &body.code, &body.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn profile(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<UserProfile>> {
    let ctx = context(&state, &headers).await?;
    Ok(Json(state.services.identity.profile(&ctx).await?))
}

async fn faculty(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<Vec<UserProfile>>> {
    let ctx = context(&state, &headers).await?;
    Ok(Json(state.services.identity.faculty_directory(&ctx).await?))
}

#[derive(Deserialize)]
pub struct RoleFilter {
    pub role: Option<Role>,
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(filter): Query<RoleFilter>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    let ctx = context(&state, &headers).await?;
    Ok(Json(state.services.identity.list_users(&ctx, filter.role).await?))
}

async fn provision_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let ctx = context(&state, &headers).await?;
    let profile = state.services.identity.provision_user(&ctx, body).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ProjectListItem<'a> {
    #[serde(flatten)]
    pub project: &'a Project,
    pub owner: Option<&'a UserProfile>,
    pub viewer_status: Option<ApplicationStatus>,
}

async fn list_projects(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let listing = state.services.catalog.list_projects(&ctx).await?;
    let items: Vec<ProjectListItem<'_>> = listing
        .iter()
        .map(|entry| ProjectListItem {
            project: entry.project,
            owner: entry.owner,
            viewer_status: entry.viewer_status,
        })
        .collect();
    Ok(Json(items).into_response())
}

/// Multipart field carrying the optional project document.
const PROJECT_FILE_FIELD: &str = "file";
/// Multipart field carrying a report.
const REPORT_FILE_FIELD: &str = "report_file";

/// A decoded `multipart/form-data` body: text fields plus one file part.
struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<Upload>,
}

/// Read every part; the part named `file_field` becomes the upload and an
/// empty one counts as absent. A request that is not a form reads as empty.
async fn read_upload_form(
    form: Result<Multipart, MultipartRejection>,
    file_field: &str,
) -> Result<UploadForm, AllocationError> {
    let mut form = match form {
        Ok(form) => form,
        Err(rejection) => {
            tracing::debug!(reason = %rejection, "Upload request carried no form");
            return Ok(UploadForm {
                fields: HashMap::new(),
                file: None,
            });
        }
    };
    let malformed = |e: MultipartError| {
        AllocationError::InvalidState(format!("malformed upload: {}", e))
    };

    let mut fields = HashMap::new();
    let mut file = None;
    while let Some(field) = form.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == file_field {
            let file_name = field.file_name().unwrap_or(file_field).to_string();
            let content = field.bytes().await.map_err(malformed)?;
            if !content.is_empty() {
                file = Some(Upload::new(file_name, content));
            }
        } else {
            fields.insert(name, field.text().await.map_err(malformed)?);
        }
    }
    Ok(UploadForm { fields, file })
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let ctx = context(&state, &headers).await?;
    let form = read_upload_form(form, PROJECT_FILE_FIELD).await?;
    let name = form.fields.get("name").map(String::as_str).unwrap_or_default();
    let project = state.services.catalog.create_project(&ctx, name, form.file).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn own_projects(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<Vec<Project>>> {
    let ctx = context(&state, &headers).await?;
    Ok(Json(state.services.catalog.own_projects(&ctx).await?))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let ctx = context(&state, &headers).await?;
    state.services.catalog.delete_project(&ctx, ProjectId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ProjectRef {
    pub project_id: Uuid,
}

async fn apply(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ProjectRef>,
) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let application = state.services.workflow.apply(&ctx, ProjectId(body.project_id)).await?;
    Ok((StatusCode::CREATED, Json(application)).into_response())
}

#[derive(Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

async fn faculty_applications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let status = match filter.status.as_deref() {
        None | Some("") => None,
        Some(value) => Some(ApplicationStatus::parse(value).ok_or_else(|| {
            AllocationError::InvalidState(format!("unknown application status '{}'", value))
        })?),
    };
    let views = state.services.workflow.faculty_applications(&ctx, status).await?;
    Ok(Json(views).into_response())
}

async fn student_applications(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    Ok(Json(state.services.workflow.student_applications(&ctx).await?).into_response())
}

#[derive(Deserialize)]
pub struct ActionRequest {
    pub action: StatusAction,
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ActionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = context(&state, &headers).await?;
    let status = state
        .services
        .workflow
        .set_status(&ctx, ApplicationId(id), body.action)
        .await?;
    Ok(Json(json!({ "status": status })))
}

async fn delete_application(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let ctx = context(&state, &headers).await?;
    state.services.workflow.delete_application(&ctx, ApplicationId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn confirm(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ProjectRef>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = context(&state, &headers).await?;
    let status = state.services.workflow.confirm(&ctx, ProjectId(body.project_id)).await?;
    Ok(Json(json!({ "status": status })))
}

async fn finalize(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let summary = state.services.workflow.finalize_confirmations(&ctx, Utc::now()).await?;
    Ok(Json(summary).into_response())
}

// ---------------------------------------------------------------------------
// Co-guides
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DelegateRequest {
    pub co_guides: Vec<String>,
}

async fn delegate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<DelegateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = context(&state, &headers).await?;
    let selection = CoGuideSelection::from_values(&body.co_guides).map_err(AllocationError::from)?;
    let delegation = state
        .services
        .co_guides
        .delegate(&ctx, ApplicationId(id), selection)
        .await?;
    Ok(Json(json!({ "co_guides": delegation.selection.to_values() })))
}

async fn view_co_guides(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = context(&state, &headers).await?;
    let selection = state.services.co_guides.view_selected(&ctx, ApplicationId(id)).await?;
    let values = selection.map(|s| s.to_values()).unwrap_or_default();
    Ok(Json(json!({ "co_guides": values })))
}

async fn respond_co_guide(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ActionRequest>,
) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let response = state
        .services
        .co_guides
        .respond(&ctx, ApplicationId(id), body.action)
        .await?;
    Ok(Json(response).into_response())
}

async fn co_guide_inbox(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    Ok(Json(state.services.co_guides.inbox(&ctx).await?).into_response())
}

// ---------------------------------------------------------------------------
// Submissions and grading
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SubmissionDetailsRequest {
    pub deadline: Option<DateTime<Utc>>,
    pub full_marks: Option<u32>,
    #[serde(default)]
    pub students: Vec<String>,
}

async fn set_submission_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmissionDetailsRequest>,
) -> ApiResult<Json<Project>> {
    let ctx = context(&state, &headers).await?;
    let details = SubmissionDetails {
        deadline: body.deadline,
        full_marks: body.full_marks,
    };
    let students = body
        .students
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(UserId::new)
        .collect();
    let project = state
        .services
        .grading
        .set_submission_details(&ctx, ProjectId(id), details, students)
        .await?;
    Ok(Json(project))
}

async fn submit_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, roll)): Path<(Uuid, String)>,
    form: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let form = read_upload_form(form, REPORT_FILE_FIELD).await?;
    let submission = state
        .services
        .grading
        .submit_report(&ctx, ProjectId(id), &UserId::new(roll), form.file)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)).into_response())
}

async fn download_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, roll)): Path<(Uuid, String)>,
) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let content = state
        .services
        .grading
        .download_report(&ctx, ProjectId(id), &UserId::new(roll))
        .await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], content).into_response())
}

async fn list_submissions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    Ok(Json(state.services.grading.list_submissions(&ctx, ProjectId(id)).await?).into_response())
}

#[derive(Deserialize)]
pub struct MarkRequest {
    pub mark: u32,
}

async fn record_marks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, roll)): Path<(Uuid, String)>,
    Json(body): Json<MarkRequest>,
) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let submission = state
        .services
        .grading
        .record_marks(&ctx, ProjectId(id), &UserId::new(roll), body.mark)
        .await?;
    Ok(Json(submission).into_response())
}

async fn view_marks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, roll)): Path<(Uuid, String)>,
) -> ApiResult<Response> {
    let ctx = context(&state, &headers).await?;
    let sheet = state
        .services
        .grading
        .view_marks(&ctx, ProjectId(id), &UserId::new(roll))
        .await?;
    Ok(Json(sheet).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Repositories;
    use crate::domain::config::AllocationConfigSpec;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::files::InMemoryFileStore;
    use crate::infrastructure::mail::RecordingNotificationSender;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn services() -> Services {
        let services = Services::new(
            &Repositories::in_memory(),
            Arc::new(InMemoryFileStore::new()),
            Arc::new(RecordingNotificationSender::new()),
            EventBus::new(64),
            &AllocationConfigSpec::default(),
        );
        let system = RequestContext::system();
        for (id, role) in [("F1", Role::Faculty), ("F2", Role::Faculty), ("S1", Role::Student)] {
            services
                .identity
                .provision_user(
                    &system,
                    NewUser {
                        id: UserId::new(id),
                        role,
                        full_name: format!("User {}", id),
                        email: format!("{}@example.com", id.to_lowercase()),
                        department: "CSE".to_string(),
                        password: "pw".to_string(),
                    },
                )
                .await
                .unwrap();
        }
        services
    }

    async fn app() -> Router {
        router(services().await)
    }

    async fn login_as(app: &Router, id: &str) -> String {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/login", None, json!({ "id": id, "password": "pw" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        body["token"].as_str().unwrap().to_string()
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap()
    }

    const BOUNDARY: &str = "btp-form-boundary";

    /// `(field, file name, content)`; a file name marks a file part.
    type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

    fn form_request(uri: &str, token: &str, parts: &[Part<'_>]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            let disposition = match file_name {
                Some(file_name) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream",
                    name, file_name
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"", name),
            };
            body.extend_from_slice(format!("--{}\r\n{}\r\n\r\n", BOUNDARY, disposition).as_bytes());
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    fn project_form(token: &str, name: &str) -> Request<Body> {
        form_request("/projects", token, &[("name", None, name.as_bytes())])
    }

    fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("theme=dark; {}={}", SESSION_COOKIE, token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let response = app.oneshot(empty_request("GET", "/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_anonymous_is_redirected_to_login() {
        let app = app().await;
        let response = app.oneshot(empty_request("GET", "/projects", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_wrong_role_is_forbidden() {
        let app = app().await;
        let token = login_as(&app, "S1").await;
        let response = app
            .oneshot(empty_request("POST", "/projects", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "Unauthorized access.");
    }

    #[tokio::test]
    async fn test_create_apply_and_list() {
        let app = app().await;
        let faculty = login_as(&app, "F1").await;
        let student = login_as(&app, "S1").await;

        let created = app
            .clone()
            .oneshot(project_form(&faculty, "P1"))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let project_id = body_json(created).await["id"].as_str().unwrap().to_string();

        let duplicate = app
            .clone()
            .oneshot(project_form(&faculty, "P1"))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(duplicate).await["code"], "duplicate_name");

        let applied = app
            .clone()
            .oneshot(json_request("POST", "/applications", Some(&student), json!({ "project_id": project_id })))
            .await
            .unwrap();
        assert_eq!(applied.status(), StatusCode::CREATED);
        assert_eq!(body_json(applied).await["status"], "Approved");

        let listing = app
            .clone()
            .oneshot(empty_request("GET", "/projects", Some(&student)))
            .await
            .unwrap();
        let listing = body_json(listing).await;
        assert_eq!(listing[0]["name"], "P1");
        assert_eq!(listing[0]["owner"]["id"], "F1");
        assert_eq!(listing[0]["viewer_status"], "Approved");

        let inbox = app
            .oneshot(empty_request("GET", "/applications?status=Approved", Some(&faculty)))
            .await
            .unwrap();
        let inbox = body_json(inbox).await;
        assert_eq!(inbox.as_array().unwrap().len(), 1);
        assert_eq!(inbox[0]["applicant"]["id"], "S1");
    }

    #[tokio::test]
    async fn test_co_guide_any_sentinel_is_verbatim() {
        let app = app().await;
        let faculty = login_as(&app, "F1").await;
        let student = login_as(&app, "S1").await;

        let created = app
            .clone()
            .oneshot(project_form(&faculty, "P1"))
            .await
            .unwrap();
        let project_id = body_json(created).await["id"].as_str().unwrap().to_string();
        let applied = app
            .clone()
            .oneshot(json_request("POST", "/applications", Some(&student), json!({ "project_id": project_id })))
            .await
            .unwrap();
        let application_id = body_json(applied).await["id"].as_str().unwrap().to_string();

        let uri = format!("/applications/{}/co-guides", application_id);
        let delegated = app
            .clone()
            .oneshot(json_request("POST", &uri, Some(&faculty), json!({ "co_guides": ["any"] })))
            .await
            .unwrap();
        assert_eq!(delegated.status(), StatusCode::OK);

        let viewed = app.oneshot(empty_request("GET", &uri, Some(&student))).await.unwrap();
        assert_eq!(body_json(viewed).await["co_guides"], json!(["any"]));
    }

    #[tokio::test]
    async fn test_mixed_any_selection_is_refused() {
        let app = app().await;
        let faculty = login_as(&app, "F1").await;
        let student = login_as(&app, "S1").await;

        let created = app.clone().oneshot(project_form(&faculty, "P1")).await.unwrap();
        let project_id = body_json(created).await["id"].as_str().unwrap().to_string();
        let applied = app
            .clone()
            .oneshot(json_request("POST", "/applications", Some(&student), json!({ "project_id": project_id })))
            .await
            .unwrap();
        let application_id = body_json(applied).await["id"].as_str().unwrap().to_string();

        let uri = format!("/applications/{}/co-guides", application_id);
        let response = app
            .oneshot(json_request("POST", &uri, Some(&faculty), json!({ "co_guides": ["F2", "any"] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["code"], "invalid_state");
    }

    #[tokio::test]
    async fn test_project_and_report_uploads_are_multipart() {
        let services = services().await;
        let app = router(services.clone());
        let faculty = login_as(&app, "F1").await;
        let student = login_as(&app, "S1").await;

        let created = app
            .clone()
            .oneshot(form_request(
                "/projects",
                &faculty,
                &[("name", None, b"P1".as_slice()), ("file", Some("brief.pdf"), b"%PDF-brief".as_slice())],
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let project = body_json(created).await;
        assert_eq!(project["name"], "P1");
        assert!(!project["file"].is_null());
        let project_id = project["id"].as_str().unwrap().to_string();

        let nameless = app
            .clone()
            .oneshot(form_request("/projects", &faculty, &[("file", Some("x.pdf"), b"x".as_slice())]))
            .await
            .unwrap();
        assert_eq!(nameless.status(), StatusCode::UNPROCESSABLE_ENTITY);

        app.clone()
            .oneshot(json_request("POST", "/applications", Some(&student), json!({ "project_id": project_id })))
            .await
            .unwrap();
        let confirmed = app
            .clone()
            .oneshot(json_request("POST", "/confirmations", Some(&student), json!({ "project_id": project_id })))
            .await
            .unwrap();
        assert_eq!(confirmed.status(), StatusCode::OK);
        services
            .workflow
            .finalize_confirmations(&RequestContext::system(), Utc::now() + chrono::Duration::hours(25))
            .await
            .unwrap();

        let uri = format!("/projects/{}/reports/S1", project_id);
        let missing = app
            .clone()
            .oneshot(form_request(&uri, &student, &[("note", None, b"draft".as_slice())]))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(missing).await["code"], "missing_file");

        let submitted = app
            .clone()
            .oneshot(form_request(&uri, &student, &[("report_file", Some("report.pdf"), b"%PDF-report".as_slice())]))
            .await
            .unwrap();
        assert_eq!(submitted.status(), StatusCode::CREATED);

        let downloaded = app.oneshot(empty_request("GET", &uri, Some(&faculty))).await.unwrap();
        assert_eq!(downloaded.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(downloaded.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-report");
    }

    #[test]
    fn test_bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "btp_session=from-cookie".parse().unwrap());
        assert_eq!(session_token(&headers), Some(SessionToken("from-cookie".to_string())));
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(session_token(&headers), Some(SessionToken("from-header".to_string())));
    }
}
