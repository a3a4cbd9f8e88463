use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Branch, Commit, Id, Project};
use crate::store::traits::{AppendOutcome, BranchStore, CommitStore, ProjectStore, Store};

/// Everything owned by one project, guarded by a single lock so that a
/// commit and its head update are published together
#[derive(Debug)]
struct ProjectEntry {
    project: Project,
    branches: Vec<Branch>,
    commits: HashMap<Id, Commit>,
    /// Commit ids in append order
    commit_log: Vec<Id>,
    idempotency_keys: HashMap<String, Id>,
}

/// In-process store; state lives for the lifetime of the server
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<Id, Arc<RwLock<ProjectEntry>>>>,
    /// Project ids in creation order
    order: RwLock<Vec<Id>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, project_id: &Id) -> Option<Arc<RwLock<ProjectEntry>>> {
        self.projects.read().get(project_id).cloned()
    }
}

#[async_trait::async_trait]
impl ProjectStore for MemoryStore {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        Ok(self.entry(id).map(|entry| entry.read().project.clone()))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        // Same lock order as create_project
        let projects = self.projects.read();
        let order = self.order.read();
        Ok(order
            .iter()
            .filter_map(|id| projects.get(id))
            .map(|entry| entry.read().project.clone())
            .collect())
    }

    async fn create_project(&self, project: Project, default_branch: Branch) -> Result<()> {
        let mut projects = self.projects.write();
        if projects.contains_key(&project.id) {
            return Err(anyhow!("Project already exists: {}", project.id));
        }

        let id = project.id.clone();
        projects.insert(
            id.clone(),
            Arc::new(RwLock::new(ProjectEntry {
                project,
                branches: vec![default_branch],
                commits: HashMap::new(),
                commit_log: Vec::new(),
                idempotency_keys: HashMap::new(),
            })),
        );
        self.order.write().push(id);
        Ok(())
    }

    async fn update_project(&self, project: Project) -> Result<bool> {
        let Some(entry) = self.entry(&project.id) else {
            return Ok(false);
        };
        let mut entry = entry.write();
        entry.project.name = project.name;
        entry.project.description = project.description;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl BranchStore for MemoryStore {
    async fn get_branch(&self, project_id: &Id, branch_id: &Id) -> Result<Option<Branch>> {
        Ok(self.entry(project_id).and_then(|entry| {
            entry
                .read()
                .branches
                .iter()
                .find(|branch| &branch.id == branch_id)
                .cloned()
        }))
    }

    async fn list_branches_for_project(&self, project_id: &Id) -> Result<Vec<Branch>> {
        Ok(self
            .entry(project_id)
            .map(|entry| entry.read().branches.clone())
            .unwrap_or_default())
    }

    async fn create_branch(&self, branch: Branch) -> Result<bool> {
        let entry = self
            .entry(&branch.project_id)
            .ok_or_else(|| anyhow!("Project not found: {}", branch.project_id))?;
        let mut entry = entry.write();
        if entry.branches.iter().any(|b| b.name == branch.name) {
            return Ok(false);
        }
        entry.branches.push(branch);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl CommitStore for MemoryStore {
    async fn get_commit(&self, project_id: &Id, commit_id: &Id) -> Result<Option<Commit>> {
        Ok(self
            .entry(project_id)
            .and_then(|entry| entry.read().commits.get(commit_id).cloned()))
    }

    async fn list_commits_for_project(&self, project_id: &Id) -> Result<Vec<Commit>> {
        let Some(entry) = self.entry(project_id) else {
            return Ok(Vec::new());
        };
        let entry = entry.read();
        Ok(entry
            .commit_log
            .iter()
            .rev()
            .filter_map(|id| entry.commits.get(id).cloned())
            .collect())
    }

    async fn find_commit_by_idempotency_key(
        &self,
        project_id: &Id,
        key: &str,
    ) -> Result<Option<Commit>> {
        Ok(self.entry(project_id).and_then(|entry| {
            let entry = entry.read();
            entry
                .idempotency_keys
                .get(key)
                .and_then(|id| entry.commits.get(id).cloned())
        }))
    }

    async fn append_commit(
        &self,
        commit: Commit,
        idempotency_key: Option<&str>,
    ) -> Result<AppendOutcome> {
        let entry = self
            .entry(&commit.project_id)
            .ok_or_else(|| anyhow!("Project not found: {}", commit.project_id))?;
        let mut entry = entry.write();

        if let Some(existing) = idempotency_key
            .and_then(|key| entry.idempotency_keys.get(key))
            .and_then(|id| entry.commits.get(id))
        {
            return Ok(AppendOutcome::Replayed(existing.clone()));
        }

        if let Some(parent) = &commit.parent_id {
            if !entry.commits.contains_key(parent) {
                return Err(anyhow!("Parent commit not found: {}", parent));
            }
        }

        let branch_index = entry
            .branches
            .iter()
            .position(|branch| branch.id == commit.branch_id)
            .ok_or_else(|| anyhow!("Branch not found: {}", commit.branch_id))?;

        let current_head = entry.branches[branch_index].head.clone();
        if current_head != commit.parent_id {
            return Ok(AppendOutcome::HeadMoved {
                actual: current_head,
            });
        }

        let commit_id = commit.id.clone();
        entry.branches[branch_index].head = Some(commit_id.clone());
        if let Some(key) = idempotency_key {
            entry
                .idempotency_keys
                .insert(key.to_string(), commit_id.clone());
        }
        entry.commit_log.push(commit_id.clone());
        entry.commits.insert(commit_id, commit);

        Ok(AppendOutcome::Appended(entry.branches[branch_index].clone()))
    }
}

impl Store for MemoryStore {}
