use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::logic::Materializer;
use crate::model::{ChangeKind, ChangeRecord, Commit, CommitData, Element, ElementKind, Id, NewCommit};
use crate::store::traits::{AppendOutcome, Store};

const COMMIT_RECORD_TYPE: &str = "Commit";
const CHANGE_RECORD_TYPE: &str = "DataVersion";

/// Everything a client submits to create one commit
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Target branch; the project's default branch when None
    pub branch_id: Option<Id>,
    pub commit: NewCommit,
    pub idempotency_key: Option<String>,
}

impl CommitRequest {
    pub fn new(commit: NewCommit) -> Self {
        Self {
            branch_id: None,
            commit,
            idempotency_key: None,
        }
    }
}

/// A validated change entry whose add/update kind is not yet settled
#[derive(Debug, Clone)]
struct Draft {
    element: Element,
    requested: Option<ChangeKind>,
}

/// Applies change batches to branches.
///
/// A batch is validated completely before anything is written, then
/// published with a single compare-and-swap on the branch head. When another
/// writer moved the head in between, the batch is re-resolved against the new
/// head and retried up to `max_retries` times.
pub struct CommitApplier<'a, S: Store> {
    store: &'a S,
    max_retries: usize,
}

impl<'a, S: Store> CommitApplier<'a, S> {
    pub fn new(store: &'a S, max_retries: usize) -> Self {
        Self { store, max_retries }
    }

    pub async fn apply(&self, project_id: &Id, request: CommitRequest) -> StoreResult<Commit> {
        let result = self.try_apply(project_id, request).await;
        if let Err(err) = &result {
            if err.is_client_error() {
                warn!("Rejected commit on project {}: [{}] {}", project_id, err.code(), err);
            }
        }
        result
    }

    async fn try_apply(&self, project_id: &Id, request: CommitRequest) -> StoreResult<Commit> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("Project '{}'", project_id)))?;
        let branch_id = request
            .branch_id
            .clone()
            .unwrap_or_else(|| project.default_branch_id.clone());

        let drafts = parse_batch(&request.commit)?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = self
                .store
                .find_commit_by_idempotency_key(project_id, key)
                .await?
            {
                info!("Replaying commit {} for idempotency key {}", existing.id, key);
                return Ok(existing);
            }
        }

        let ids: HashSet<Id> = drafts.iter().map(|draft| draft.element.id.clone()).collect();
        let comment = request.commit.comment();
        let expected = request.commit.previous_commit.as_ref().map(|r| &r.id);

        for attempt in 0..=self.max_retries {
            let branch = self
                .store
                .get_branch(project_id, &branch_id)
                .await?
                .ok_or_else(|| StoreError::not_found(format!("Branch '{}'", branch_id)))?;

            if let Some(expected) = expected {
                if branch.head.as_ref() != Some(expected) {
                    return Err(StoreError::Conflict(format!(
                        "branch '{}' head is {}, expected {}",
                        branch.name,
                        branch.head.as_deref().unwrap_or("empty"),
                        expected
                    )));
                }
            }

            let visible = Materializer::new(self.store)
                .visible_kinds(project_id, branch.head.as_ref(), &ids)
                .await?;
            let changes = resolve_changes(&drafts, &visible)?;

            let commit = Commit::new(
                project_id.clone(),
                branch.id.clone(),
                branch.head.clone(),
                &CommitData { changes },
                comment.clone(),
            )?;

            match self
                .store
                .append_commit(commit.clone(), request.idempotency_key.as_deref())
                .await?
            {
                AppendOutcome::Appended(branch) => {
                    info!(
                        "Commit {} on {}/{}: {} change(s)",
                        commit.id, project_id, branch.name, commit.elements_count
                    );
                    return Ok(commit);
                }
                AppendOutcome::Replayed(existing) => {
                    info!(
                        "Replaying commit {} for idempotency key {:?}",
                        existing.id, request.idempotency_key
                    );
                    return Ok(existing);
                }
                AppendOutcome::HeadMoved { actual } => {
                    debug!(
                        "Head of branch {} moved to {:?} (attempt {}/{}), retrying",
                        branch.id,
                        actual,
                        attempt + 1,
                        self.max_retries + 1
                    );
                }
            }
        }

        Err(StoreError::Conflict(format!(
            "branch '{}' kept moving; gave up after {} attempts",
            branch_id,
            self.max_retries + 1
        )))
    }
}

/// Check the envelope and turn every change entry into a validated element
fn parse_batch(commit: &NewCommit) -> StoreResult<Vec<Draft>> {
    if let Some(record_type) = &commit.record_type {
        if record_type != COMMIT_RECORD_TYPE {
            return Err(StoreError::malformed(format!(
                "expected '@type' {}, got {}",
                COMMIT_RECORD_TYPE, record_type
            )));
        }
    }

    if commit.change.is_empty() {
        return Err(StoreError::malformed("commit contains no changes"));
    }

    let drafts = commit
        .change
        .iter()
        .enumerate()
        .map(|(index, change)| {
            if let Some(record_type) = &change.record_type {
                if record_type != CHANGE_RECORD_TYPE {
                    return Err(StoreError::malformed(format!(
                        "expected '@type' {}, got {}",
                        CHANGE_RECORD_TYPE, record_type
                    ))
                    .at_change(index));
                }
            }

            let payload = match &change.payload {
                Some(payload) if !payload.is_null() => payload.clone(),
                _ => {
                    return Err(StoreError::malformed(
                        "payload is null; deleting elements is not supported",
                    )
                    .at_change(index))
                }
            };

            let identity = change.identity.as_ref().map(|r| &r.id);
            let element = Element::from_payload(payload, identity).map_err(|e| e.at_change(index))?;

            Ok(Draft {
                element,
                requested: change.kind,
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;

    if let Some(duplicate) = drafts.iter().map(|draft| &draft.element.id).duplicates().next() {
        let index = drafts
            .iter()
            .positions(|draft| &draft.element.id == duplicate)
            .nth(1)
            .unwrap_or_default();
        return Err(StoreError::malformed(format!(
            "element '{}' appears more than once in the batch",
            duplicate
        ))
        .at_change(index));
    }

    Ok(drafts)
}

/// Settle add vs update for every draft against what the parent makes visible
fn resolve_changes(
    drafts: &[Draft],
    visible: &HashMap<Id, ElementKind>,
) -> StoreResult<Vec<ChangeRecord>> {
    drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| {
            let kind = resolve_kind(draft, visible.get(&draft.element.id).copied())
                .map_err(|e| e.at_change(index))?;
            Ok(ChangeRecord {
                kind,
                element: draft.element.clone(),
            })
        })
        .collect()
}

fn resolve_kind(draft: &Draft, existing: Option<ElementKind>) -> StoreResult<ChangeKind> {
    let id = &draft.element.id;
    match (draft.requested, existing) {
        (Some(ChangeKind::Add), Some(_)) => Err(StoreError::DuplicateElement(id.clone())),
        (Some(ChangeKind::Update), None) => Err(StoreError::UnknownElement(id.clone())),
        (_, None) => Ok(ChangeKind::Add),
        (_, Some(kind)) if kind != draft.element.kind => Err(StoreError::malformed(format!(
            "element '{}' is a {} and cannot become a {}",
            id, kind, draft.element.kind
        ))),
        (_, Some(_)) => Ok(ChangeKind::Update),
    }
}
