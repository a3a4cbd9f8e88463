use crate::api::handlers::{rejection_error, to_api_error, ApiResult, AppState};
use crate::logic::ProjectOperations;
use crate::model::{Branch, BranchState, Id, NewBranch, Reference};
use crate::store::traits::Store;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BranchResponse {
    #[serde(rename = "@id")]
    pub id: Id,
    #[serde(rename = "@type")]
    pub record_type: &'static str,
    pub name: String,
    pub created: String,
    #[serde(rename = "owningProject")]
    pub owning_project: Reference,
    /// Null until the first commit lands on the branch
    pub head: Option<Reference>,
    pub state: BranchState,
}

impl From<Branch> for BranchResponse {
    fn from(branch: Branch) -> Self {
        Self {
            state: branch.state(),
            owning_project: Reference::from(&branch.project_id),
            head: branch.head.as_ref().map(Reference::from),
            id: branch.id,
            record_type: "Branch",
            name: branch.name,
            created: branch.created_at,
        }
    }
}

/// GET /projects/{project_id}/branches
pub async fn list_branches<S: Store>(
    Path(project_id): Path<Id>,
    State(state): State<AppState<S>>,
) -> ApiResult<Vec<BranchResponse>> {
    let branches = ProjectOperations::list_branches(&state.store, &project_id)
        .await
        .map_err(to_api_error)?;
    Ok(Json(branches.into_iter().map(BranchResponse::from).collect()))
}

/// GET /projects/{project_id}/branches/{branch_id}
pub async fn get_branch<S: Store>(
    Path((project_id, branch_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
) -> ApiResult<BranchResponse> {
    ProjectOperations::get_project(&state.store, &project_id)
        .await
        .map_err(to_api_error)?;
    let branch = ProjectOperations::get_branch(&state.store, &project_id, &branch_id)
        .await
        .map_err(to_api_error)?;
    Ok(Json(branch.into()))
}

/// POST /projects/{project_id}/branches
pub async fn create_branch<S: Store>(
    Path(project_id): Path<Id>,
    State(state): State<AppState<S>>,
    payload: Result<Json<NewBranch>, JsonRejection>,
) -> ApiResult<BranchResponse> {
    let Json(request) = payload.map_err(rejection_error)?;
    let branch = ProjectOperations::create_branch(&state.store, &project_id, request)
        .await
        .map_err(to_api_error)?;
    Ok(Json(branch.into()))
}
