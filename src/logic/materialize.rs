use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::anyhow;

use crate::error::{StoreError, StoreResult};
use crate::model::{ChangeRecord, Commit, CommitData, Element, ElementKind, Id};
use crate::store::traits::CommitStore;

/// Read side of the store: turns commits into element sets.
///
/// Commits are immutable, so nothing here takes locks beyond the single
/// lookups the store performs.
pub struct Materializer<'a, S: CommitStore> {
    store: &'a S,
}

impl<'a, S: CommitStore> Materializer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn commit(&self, project_id: &Id, commit_id: &Id) -> StoreResult<Commit> {
        self.store
            .get_commit(project_id, commit_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("Commit '{}'", commit_id)))
    }

    async fn commit_data(&self, project_id: &Id, commit_id: &Id) -> StoreResult<(Commit, CommitData)> {
        let commit = self.commit(project_id, commit_id).await?;
        let data = commit.get_data()?;
        Ok((commit, data))
    }

    /// Change entries exactly as accepted, in submission order
    pub async fn changes(&self, project_id: &Id, commit_id: &Id) -> StoreResult<Vec<ChangeRecord>> {
        let (_, data) = self.commit_data(project_id, commit_id).await?;
        Ok(data.changes)
    }

    /// Elements introduced by this commit only
    pub async fn delta_elements(&self, project_id: &Id, commit_id: &Id) -> StoreResult<Vec<Element>> {
        let (_, data) = self.commit_data(project_id, commit_id).await?;
        Ok(data.changes.into_iter().map(|change| change.element).collect())
    }

    /// Walk from `commit_id` towards the root, calling `visit` on each commit's
    /// data until it returns false.
    async fn walk_ancestry<F>(&self, project_id: &Id, commit_id: &Id, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(CommitData) -> bool + Send,
    {
        let mut seen = HashSet::new();
        let mut next = Some(commit_id.clone());

        while let Some(id) = next {
            if !seen.insert(id.clone()) {
                return Err(StoreError::Backend(anyhow!(
                    "Commit history of project {} loops at {}",
                    project_id,
                    id
                )));
            }
            let (commit, data) = self.commit_data(project_id, &id).await?;
            if !visit(data) {
                break;
            }
            next = commit.parent_id;
        }

        Ok(())
    }

    /// Full model state at a commit: newest version of every element
    /// introduced by the commit or any ancestor, ordered by id
    pub async fn visible_elements(&self, project_id: &Id, commit_id: &Id) -> StoreResult<Vec<Element>> {
        let mut visible: BTreeMap<Id, Element> = BTreeMap::new();

        self.walk_ancestry(project_id, commit_id, |data| {
            // Newest commit first; within a commit ids are unique
            for change in data.changes {
                visible.entry(change.element.id.clone()).or_insert(change.element);
            }
            true
        })
        .await?;

        Ok(visible.into_values().collect())
    }

    /// Newest version of one element visible at a commit
    pub async fn visible_element(
        &self,
        project_id: &Id,
        commit_id: &Id,
        element_id: &Id,
    ) -> StoreResult<Element> {
        let mut found = None;

        self.walk_ancestry(project_id, commit_id, |data| {
            found = data
                .changes
                .into_iter()
                .map(|change| change.element)
                .find(|element| &element.id == element_id);
            found.is_none()
        })
        .await?;

        found.ok_or_else(|| {
            StoreError::not_found(format!(
                "Element '{}' at commit '{}'",
                element_id, commit_id
            ))
        })
    }

    /// Kinds of those `ids` that are visible at `head`.
    ///
    /// Stops walking as soon as every id has been resolved.
    pub async fn visible_kinds(
        &self,
        project_id: &Id,
        head: Option<&Id>,
        ids: &HashSet<Id>,
    ) -> StoreResult<HashMap<Id, ElementKind>> {
        let mut kinds = HashMap::new();
        let Some(head) = head else {
            return Ok(kinds);
        };
        if ids.is_empty() {
            return Ok(kinds);
        }

        self.walk_ancestry(project_id, head, |data| {
            for element in data.elements() {
                if ids.contains(&element.id) && !kinds.contains_key(&element.id) {
                    kinds.insert(element.id.clone(), element.kind);
                }
            }
            kinds.len() < ids.len()
        })
        .await?;

        Ok(kinds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Branch, ChangeKind, Project};
    use crate::store::traits::{BranchStore, ProjectStore};
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn commit_elements(
        store: &MemoryStore,
        branch: &Branch,
        payloads: Vec<serde_json::Value>,
    ) -> Commit {
        let head = store
            .get_branch(&branch.project_id, &branch.id)
            .await
            .unwrap()
            .unwrap()
            .head;
        let changes = payloads
            .into_iter()
            .map(|payload| ChangeRecord {
                kind: ChangeKind::Add,
                element: Element::from_payload(payload, None).unwrap(),
            })
            .collect();
        let commit = Commit::new(
            branch.project_id.clone(),
            branch.id.clone(),
            head,
            &CommitData { changes },
            None,
        )
        .unwrap();
        store.append_commit(commit.clone(), None).await.unwrap();
        commit
    }

    #[tokio::test]
    async fn test_later_versions_shadow_earlier_ones() {
        let store = MemoryStore::new();
        let (project, branch) = Project::new("Brakes".to_string(), None);
        store.create_project(project.clone(), branch.clone()).await.unwrap();

        let first = commit_elements(
            &store,
            &branch,
            vec![
                json!({"@type": "PartDefinition", "@id": "pedal", "name": "Pedal"}),
                json!({"@type": "PartDefinition", "@id": "disc", "name": "BrakeDisc"}),
            ],
        )
        .await;
        let second = commit_elements(
            &store,
            &branch,
            vec![json!({"@type": "PartDefinition", "@id": "pedal", "name": "BrakePedal"})],
        )
        .await;

        let materializer = Materializer::new(&store);

        let delta = materializer.delta_elements(&project.id, &second.id).await.unwrap();
        assert_eq!(delta.len(), 1);

        let visible = materializer.visible_elements(&project.id, &second.id).await.unwrap();
        let names: Vec<_> = visible.iter().map(|e| (e.id.as_str(), e.name())).collect();
        assert_eq!(
            names,
            vec![("disc", Some("BrakeDisc")), ("pedal", Some("BrakePedal"))]
        );

        // History is untouched
        let old = materializer.visible_element(&project.id, &first.id, &"pedal".to_string()).await.unwrap();
        assert_eq!(old.name(), Some("Pedal"));

        let missing = materializer
            .visible_element(&project.id, &first.id, &"caliper".to_string())
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_visible_kinds_only_reports_requested_ids() {
        let store = MemoryStore::new();
        let (project, branch) = Project::new("Brakes".to_string(), None);
        store.create_project(project.clone(), branch.clone()).await.unwrap();

        let commit = commit_elements(
            &store,
            &branch,
            vec![
                json!({"@type": "PartDefinition", "@id": "pedal"}),
                json!({"@type": "RequirementDefinition", "@id": "req"}),
            ],
        )
        .await;

        let ids: HashSet<Id> = ["req".to_string(), "unknown".to_string()].into_iter().collect();
        let kinds = Materializer::new(&store)
            .visible_kinds(&project.id, Some(&commit.id), &ids)
            .await
            .unwrap();
        assert_eq!(kinds.len(), 1);
        assert_eq!(kinds.get("req"), Some(&ElementKind::RequirementDefinition));

        let none = Materializer::new(&store)
            .visible_kinds(&project.id, None, &ids)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_commit_is_not_found() {
        let store = MemoryStore::new();
        let err = Materializer::new(&store)
            .delta_elements(&"nope".to_string(), &"missing".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
