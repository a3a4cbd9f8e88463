use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::StoreError;
use crate::logic::{CommitApplier, CommitRequest, Materializer, ProjectOperations};
use crate::model::{
    ChangeKind, ChangeRecord, Commit, Element, Id, NewCommit, NewProject, Project, ProjectUpdate,
    Reference,
};
use crate::store::traits::Store;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared state behind every handler
pub struct ModelStoreState<S> {
    pub store: S,
    /// Extra attempts when a commit loses the race for a branch head
    pub max_commit_retries: usize,
}

impl<S: Store> ModelStoreState<S> {
    pub fn new(store: S, max_commit_retries: usize) -> AppState<S> {
        Arc::new(Self {
            store,
            max_commit_retries,
        })
    }
}

pub type AppState<S> = Arc<ModelStoreState<S>>;

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(message: &str, code: &str) -> Self {
        Self {
            error: message.to_string(),
            code: code.to_string(),
        }
    }
}

pub fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::UnknownType(_) | StoreError::AbstractType(_) | StoreError::Malformed(_) => {
            StatusCode::BAD_REQUEST
        }
        StoreError::NotFound(_) | StoreError::UnknownElement(_) => StatusCode::NOT_FOUND,
        StoreError::DuplicateElement(_) | StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::InvalidChange { source, .. } => status_for(source),
        StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn to_api_error(err: StoreError) -> ApiError {
    if !err.is_client_error() {
        log::error!("Backend failure: {:?}", err);
    }
    (
        status_for(&err),
        Json(ErrorResponse::new(&err.to_string(), err.code())),
    )
}

/// Body that did not deserialize into the expected request shape
pub fn rejection_error(rejection: JsonRejection) -> ApiError {
    to_api_error(StoreError::malformed(rejection.body_text()))
}

/// Query string that did not deserialize into the expected parameters
pub fn query_rejection_error(rejection: QueryRejection) -> ApiError {
    to_api_error(StoreError::malformed(rejection.body_text()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectResponse {
    #[serde(rename = "@id")]
    pub id: Id,
    #[serde(rename = "@type")]
    pub record_type: &'static str,
    pub name: String,
    pub description: Option<String>,
    pub created: String,
    #[serde(rename = "defaultBranch")]
    pub default_branch: Reference,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            default_branch: Reference::from(&project.default_branch_id),
            id: project.id,
            record_type: "Project",
            name: project.name,
            description: project.description,
            created: project.created_at,
        }
    }
}

/// Commit metadata; the change blob itself is served by the changes endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CommitResponse {
    #[serde(rename = "@id")]
    pub id: Id,
    #[serde(rename = "@type")]
    pub record_type: &'static str,
    #[serde(rename = "owningProject")]
    pub owning_project: Reference,
    pub branch: Reference,
    #[serde(rename = "previousCommit")]
    pub previous_commit: Option<Reference>,
    pub description: Option<String>,
    pub created: String,
    #[serde(rename = "dataSize")]
    pub data_size: i64,
    #[serde(rename = "elementsCount")]
    pub elements_count: i32,
}

impl From<Commit> for CommitResponse {
    fn from(commit: Commit) -> Self {
        Self {
            owning_project: Reference::from(&commit.project_id),
            branch: Reference::from(&commit.branch_id),
            previous_commit: commit.parent_id.as_ref().map(Reference::from),
            id: commit.id,
            record_type: "Commit",
            description: commit.comment,
            created: commit.created_at,
            data_size: commit.data_size,
            elements_count: commit.elements_count,
        }
    }
}

/// A stored change entry in its wire form
#[derive(Debug, Clone, Serialize)]
pub struct DataVersionResponse {
    #[serde(rename = "@type")]
    pub record_type: &'static str,
    pub identity: Reference,
    pub kind: ChangeKind,
    pub payload: Element,
}

impl From<ChangeRecord> for DataVersionResponse {
    fn from(change: ChangeRecord) -> Self {
        Self {
            record_type: "DataVersion",
            identity: Reference::from(&change.element.id),
            kind: change.kind,
            payload: change.element,
        }
    }
}

/// GET /projects
pub async fn list_projects<S: Store>(
    State(state): State<AppState<S>>,
) -> ApiResult<Vec<ProjectResponse>> {
    let projects = ProjectOperations::list_projects(&state.store)
        .await
        .map_err(to_api_error)?;
    Ok(Json(projects.into_iter().map(ProjectResponse::from).collect()))
}

/// POST /projects
pub async fn create_project<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<NewProject>, JsonRejection>,
) -> ApiResult<ProjectResponse> {
    let Json(request) = payload.map_err(rejection_error)?;
    let project = ProjectOperations::create_project(&state.store, request)
        .await
        .map_err(to_api_error)?;
    Ok(Json(project.into()))
}

/// GET /projects/{project_id}
pub async fn get_project<S: Store>(
    Path(project_id): Path<Id>,
    State(state): State<AppState<S>>,
) -> ApiResult<ProjectResponse> {
    let project = ProjectOperations::get_project(&state.store, &project_id)
        .await
        .map_err(to_api_error)?;
    Ok(Json(project.into()))
}

/// PUT /projects/{project_id}
pub async fn update_project<S: Store>(
    Path(project_id): Path<Id>,
    State(state): State<AppState<S>>,
    payload: Result<Json<ProjectUpdate>, JsonRejection>,
) -> ApiResult<ProjectResponse> {
    let Json(update) = payload.map_err(rejection_error)?;
    let project = ProjectOperations::update_project(&state.store, &project_id, update)
        .await
        .map_err(to_api_error)?;
    Ok(Json(project.into()))
}

#[derive(Debug, Deserialize)]
pub struct CommitQuery {
    #[serde(rename = "branchId")]
    pub branch_id: Option<Id>,
}

/// POST /projects/{project_id}/commits
pub async fn create_commit<S: Store>(
    Path(project_id): Path<Id>,
    query: Result<Query<CommitQuery>, QueryRejection>,
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    payload: Result<Json<NewCommit>, JsonRejection>,
) -> ApiResult<CommitResponse> {
    let Query(query) = query.map_err(query_rejection_error)?;
    let Json(commit) = payload.map_err(rejection_error)?;

    let idempotency_key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| to_api_error(StoreError::malformed("Idempotency-Key must be ASCII")))?
                .to_string(),
        ),
        None => None,
    };

    let request = CommitRequest {
        branch_id: query.branch_id,
        commit,
        idempotency_key,
    };

    let commit = CommitApplier::new(&state.store, state.max_commit_retries)
        .apply(&project_id, request)
        .await
        .map_err(to_api_error)?;
    Ok(Json(commit.into()))
}

/// GET /projects/{project_id}/commits
pub async fn list_commits<S: Store>(
    Path(project_id): Path<Id>,
    State(state): State<AppState<S>>,
) -> ApiResult<Vec<CommitResponse>> {
    let commits = ProjectOperations::list_commits(&state.store, &project_id)
        .await
        .map_err(to_api_error)?;
    Ok(Json(commits.into_iter().map(CommitResponse::from).collect()))
}

/// GET /projects/{project_id}/commits/{commit_id}
pub async fn get_commit<S: Store>(
    Path((project_id, commit_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
) -> ApiResult<CommitResponse> {
    ProjectOperations::get_project(&state.store, &project_id)
        .await
        .map_err(to_api_error)?;
    let commit = Materializer::new(&state.store)
        .commit(&project_id, &commit_id)
        .await
        .map_err(to_api_error)?;
    Ok(Json(commit.into()))
}

/// GET /projects/{project_id}/commits/{commit_id}/changes
pub async fn get_commit_changes<S: Store>(
    Path((project_id, commit_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
) -> ApiResult<Vec<DataVersionResponse>> {
    ProjectOperations::get_project(&state.store, &project_id)
        .await
        .map_err(to_api_error)?;
    let changes = Materializer::new(&state.store)
        .changes(&project_id, &commit_id)
        .await
        .map_err(to_api_error)?;
    Ok(Json(changes.into_iter().map(DataVersionResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ElementsQuery {
    /// `delta` (default) or `visible`
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementScope {
    Delta,
    Visible,
}

impl ElementScope {
    pub fn parse(scope: Option<&str>) -> Result<Self, StoreError> {
        match scope {
            None | Some("delta") => Ok(ElementScope::Delta),
            Some("visible") => Ok(ElementScope::Visible),
            Some(other) => Err(StoreError::malformed(format!(
                "unknown scope '{}', expected 'delta' or 'visible'",
                other
            ))),
        }
    }
}

/// GET /projects/{project_id}/commits/{commit_id}/elements
pub async fn get_commit_elements<S: Store>(
    Path((project_id, commit_id)): Path<(Id, Id)>,
    query: Result<Query<ElementsQuery>, QueryRejection>,
    State(state): State<AppState<S>>,
) -> ApiResult<Vec<Element>> {
    let Query(query) = query.map_err(query_rejection_error)?;
    let scope = ElementScope::parse(query.scope.as_deref()).map_err(to_api_error)?;
    ProjectOperations::get_project(&state.store, &project_id)
        .await
        .map_err(to_api_error)?;

    let materializer = Materializer::new(&state.store);
    let elements = match scope {
        ElementScope::Delta => materializer.delta_elements(&project_id, &commit_id).await,
        ElementScope::Visible => materializer.visible_elements(&project_id, &commit_id).await,
    }
    .map_err(to_api_error)?;

    Ok(Json(elements))
}

/// GET /projects/{project_id}/commits/{commit_id}/elements/{element_id}
pub async fn get_commit_element<S: Store>(
    Path((project_id, commit_id, element_id)): Path<(Id, Id, Id)>,
    State(state): State<AppState<S>>,
) -> ApiResult<Element> {
    ProjectOperations::get_project(&state.store, &project_id)
        .await
        .map_err(to_api_error)?;
    let element = Materializer::new(&state.store)
        .visible_element(&project_id, &commit_id, &element_id)
        .await
        .map_err(to_api_error)?;
    Ok(Json(element))
}
