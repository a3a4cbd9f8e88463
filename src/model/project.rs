use crate::model::{generate_id, timestamp, Id, Reference};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BRANCH_NAME: &str = "main";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String, // ISO 8601 timestamp
    pub default_branch_id: Id,
}

impl Project {
    /// Create a project together with its empty default branch
    pub fn new(name: String, description: Option<String>) -> (Self, Branch) {
        let id = generate_id();
        let main_branch = Branch::new_main_branch(id.clone());
        let project = Self {
            id,
            name,
            description,
            created_at: timestamp(),
            default_branch_id: main_branch.id.clone(),
        };
        (project, main_branch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchState {
    Empty,  // No commits yet
    Active, // Head points to a commit
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: Id,
    pub project_id: Id,
    pub name: String,
    pub created_at: String,   // ISO 8601 timestamp
    pub head: Option<Id>,     // Current commit, None while the history is empty
}

impl Branch {
    pub fn new_main_branch(project_id: Id) -> Self {
        Self::new(project_id, DEFAULT_BRANCH_NAME.to_string(), None)
    }

    pub fn new(project_id: Id, name: String, head: Option<Id>) -> Self {
        Self {
            id: generate_id(),
            project_id,
            name,
            created_at: timestamp(),
            head,
        }
    }

    pub fn state(&self) -> BranchState {
        match self.head {
            Some(_) => BranchState::Active,
            None => BranchState::Empty,
        }
    }
}

/// Input model for creating a new project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    #[serde(rename = "@type", default)]
    pub record_type: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Metadata edit; absent fields stay as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Input model for creating a branch.
///
/// The new head is taken from `head` (a commit), or from `fromBranch`'s head,
/// or from the default branch's head when neither is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBranch {
    #[serde(rename = "@type", default)]
    pub record_type: Option<String>,
    pub name: String,
    #[serde(default)]
    pub head: Option<Reference>,
    #[serde(rename = "fromBranch", default)]
    pub from_branch: Option<Reference>,
}
