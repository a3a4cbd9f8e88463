use log::info;

use crate::error::{StoreError, StoreResult};
use crate::model::{Branch, Commit, Id, NewBranch, NewProject, Project, ProjectUpdate};
use crate::store::traits::Store;

pub struct ProjectOperations;

fn check_record_type(record_type: Option<&String>, expected: &str) -> StoreResult<()> {
    match record_type {
        Some(actual) if actual != expected => Err(StoreError::malformed(format!(
            "expected '@type' {}, got {}",
            expected, actual
        ))),
        _ => Ok(()),
    }
}

fn required_name(name: &str, what: &str) -> StoreResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::malformed(format!("{} name must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

impl ProjectOperations {
    /// Create a project with its empty `main` branch
    pub async fn create_project<S: Store>(store: &S, request: NewProject) -> StoreResult<Project> {
        check_record_type(request.record_type.as_ref(), "Project")?;
        let name = required_name(&request.name, "project")?;

        let (project, main_branch) = Project::new(name, request.description);
        store.create_project(project.clone(), main_branch).await?;

        info!("Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    pub async fn get_project<S: Store>(store: &S, project_id: &Id) -> StoreResult<Project> {
        store
            .get_project(project_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("Project '{}'", project_id)))
    }

    pub async fn list_projects<S: Store>(store: &S) -> StoreResult<Vec<Project>> {
        Ok(store.list_projects().await?)
    }

    /// Edit name and/or description; identifier and default branch never change
    pub async fn update_project<S: Store>(
        store: &S,
        project_id: &Id,
        update: ProjectUpdate,
    ) -> StoreResult<Project> {
        let mut project = Self::get_project(store, project_id).await?;

        if let Some(name) = update.name {
            project.name = required_name(&name, "project")?;
        }
        if let Some(description) = update.description {
            project.description = Some(description);
        }

        if !store.update_project(project.clone()).await? {
            return Err(StoreError::not_found(format!("Project '{}'", project_id)));
        }
        Ok(project)
    }

    pub async fn default_branch<S: Store>(store: &S, project_id: &Id) -> StoreResult<Branch> {
        let project = Self::get_project(store, project_id).await?;
        Self::get_branch(store, project_id, &project.default_branch_id).await
    }

    /// Project -> default branch -> head commit id (None while empty)
    pub async fn resolve_head<S: Store>(store: &S, project_id: &Id) -> StoreResult<Option<Id>> {
        Ok(Self::default_branch(store, project_id).await?.head)
    }

    pub async fn get_branch<S: Store>(
        store: &S,
        project_id: &Id,
        branch_id: &Id,
    ) -> StoreResult<Branch> {
        store
            .get_branch(project_id, branch_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("Branch '{}'", branch_id)))
    }

    pub async fn list_branches<S: Store>(store: &S, project_id: &Id) -> StoreResult<Vec<Branch>> {
        Self::get_project(store, project_id).await?;
        Ok(store.list_branches_for_project(project_id).await?)
    }

    /// Create a branch starting at a commit, at another branch's head, or at
    /// the default branch's head
    pub async fn create_branch<S: Store>(
        store: &S,
        project_id: &Id,
        request: NewBranch,
    ) -> StoreResult<Branch> {
        check_record_type(request.record_type.as_ref(), "Branch")?;
        let name = required_name(&request.name, "branch")?;

        let head = match (request.head, request.from_branch) {
            (Some(_), Some(_)) => {
                return Err(StoreError::malformed(
                    "give either 'head' or 'fromBranch', not both",
                ))
            }
            (Some(commit), None) => {
                Self::get_project(store, project_id).await?;
                let commit = store
                    .get_commit(project_id, &commit.id)
                    .await?
                    .ok_or_else(|| StoreError::not_found(format!("Commit '{}'", commit.id)))?;
                Some(commit.id)
            }
            (None, Some(source)) => {
                Self::get_project(store, project_id).await?;
                Self::get_branch(store, project_id, &source.id).await?.head
            }
            (None, None) => Self::resolve_head(store, project_id).await?,
        };

        let branch = Branch::new(project_id.clone(), name, head);
        if !store.create_branch(branch.clone()).await? {
            return Err(StoreError::Conflict(format!(
                "branch '{}' already exists",
                branch.name
            )));
        }

        info!(
            "Created branch {} ({}) in project {} at {:?}",
            branch.name, branch.id, project_id, branch.head
        );
        Ok(branch)
    }

    /// Every commit of the project, newest first
    pub async fn list_commits<S: Store>(store: &S, project_id: &Id) -> StoreResult<Vec<Commit>> {
        Self::get_project(store, project_id).await?;
        Ok(store.list_commits_for_project(project_id).await?)
    }
}
