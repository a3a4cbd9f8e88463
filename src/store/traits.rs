use crate::model::{Branch, Commit, Id, Project};
use anyhow::Result;

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>>;
    /// Projects in creation order
    async fn list_projects(&self) -> Result<Vec<Project>>;
    /// Persist a project and its default branch in one step
    async fn create_project(&self, project: Project, default_branch: Branch) -> Result<()>;
    /// Overwrite name/description; false if the project does not exist
    async fn update_project(&self, project: Project) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait BranchStore: Send + Sync {
    async fn get_branch(&self, project_id: &Id, branch_id: &Id) -> Result<Option<Branch>>;
    async fn list_branches_for_project(&self, project_id: &Id) -> Result<Vec<Branch>>;
    /// Insert a new branch; false if the project already has one with that name
    async fn create_branch(&self, branch: Branch) -> Result<bool>;
}

/// Result of trying to publish a commit and move a branch head
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Commit stored and head advanced
    Appended(Branch),
    /// Head was not the expected parent; nothing was written
    HeadMoved { actual: Option<Id> },
    /// Idempotency key already recorded; nothing was written
    Replayed(Commit),
}

#[async_trait::async_trait]
pub trait CommitStore: Send + Sync {
    async fn get_commit(&self, project_id: &Id, commit_id: &Id) -> Result<Option<Commit>>;
    /// Every commit of a project, newest first
    async fn list_commits_for_project(&self, project_id: &Id) -> Result<Vec<Commit>>;
    async fn find_commit_by_idempotency_key(
        &self,
        project_id: &Id,
        key: &str,
    ) -> Result<Option<Commit>>;
    /// Atomically store `commit` and advance its branch from `commit.parent_id`.
    ///
    /// Compare-and-swap: the head must still equal `commit.parent_id`. When an
    /// idempotency key is given it is recorded in the same step.
    async fn append_commit(
        &self,
        commit: Commit,
        idempotency_key: Option<&str>,
    ) -> Result<AppendOutcome>;
}

pub trait Store: ProjectStore + BranchStore + CommitStore + Send + Sync {}
