use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::model::{timestamp, Element, Id, Reference};

/// Whether a change entry introduces a new element or supersedes one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Update,
}

/// One accepted change entry as stored inside a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub element: Element,
}

/// Content stored in a commit's binary data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitData {
    pub changes: Vec<ChangeRecord>,
}

impl CommitData {
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.changes.iter().map(|change| &change.element)
    }
}

/// An immutable batch of element changes on top of a parent commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// SHA-256 hash of the commit content
    pub id: Id,
    pub project_id: Id,
    /// Branch the commit was created on
    pub branch_id: Id,
    /// Previous head (None for the first commit of a branch history)
    pub parent_id: Option<Id>,
    pub comment: Option<String>,
    pub created_at: String, // ISO 8601 string

    /// Gzip-compressed JSON of the change list
    pub data: Vec<u8>,
    /// Uncompressed size for monitoring
    pub data_size: i64,
    pub elements_count: i32,
}

impl Commit {
    pub fn new(
        project_id: Id,
        branch_id: Id,
        parent_id: Option<Id>,
        commit_data: &CommitData,
        comment: Option<String>,
    ) -> anyhow::Result<Self> {
        let serialized =
            serde_json::to_string(commit_data).context("Failed to serialize commit data")?;
        let data = Self::compress_data(serialized.as_bytes())?;
        let created_at = timestamp();
        let id = Self::calculate_hash(
            &project_id,
            &branch_id,
            parent_id.as_deref(),
            comment.as_deref(),
            &created_at,
            &serialized,
        );

        Ok(Self {
            id,
            project_id,
            branch_id,
            parent_id,
            comment,
            created_at,
            data,
            data_size: serialized.len() as i64,
            elements_count: commit_data.changes.len() as i32,
        })
    }

    /// Calculate SHA-256 hash for the commit
    fn calculate_hash(
        project_id: &str,
        branch_id: &str,
        parent_id: Option<&str>,
        comment: Option<&str>,
        created_at: &str,
        data: &str,
    ) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(format!("project:{}\n", project_id));
        hasher.update(format!("branch:{}\n", branch_id));
        if let Some(parent) = parent_id {
            hasher.update(format!("parent:{}\n", parent));
        }
        if let Some(comment) = comment {
            hasher.update(format!("comment:{}\n", comment));
        }
        hasher.update(format!("created:{}\n", created_at));
        hasher.update(format!("data:{}\n", data));

        hex::encode(hasher.finalize())
    }

    fn compress_data(data: &[u8]) -> anyhow::Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .context("Failed to compress commit data")?;
        encoder.finish().context("Failed to compress commit data")
    }

    fn decompress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        // gzip magic bytes (1f 8b); anything else is stored uncompressed
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            let mut decoder = GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            Ok(decompressed)
        } else {
            Ok(data.to_vec())
        }
    }

    /// Decompress and deserialize the change list
    pub fn get_data(&self) -> anyhow::Result<CommitData> {
        let decompressed = Self::decompress_data(&self.data)
            .with_context(|| format!("Failed to decompress commit {}", self.id))?;
        serde_json::from_slice(&decompressed)
            .with_context(|| format!("Failed to decode commit {}", self.id))
    }
}

/// Change entry as submitted by a client:
/// `{"@type": "DataVersion", "identity": {"@id"}, "kind", "payload": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChange {
    #[serde(rename = "@type", default)]
    pub record_type: Option<String>,
    #[serde(default)]
    pub identity: Option<Reference>,
    /// Omitted by most clients; inferred from the parent commit
    #[serde(default)]
    pub kind: Option<ChangeKind>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Commit creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommit {
    #[serde(rename = "@type", default)]
    pub record_type: Option<String>,
    #[serde(default)]
    pub change: Vec<NewChange>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Alternative spelling of `comment` used by some clients
    #[serde(default)]
    pub description: Option<String>,
    /// Expected current head; the commit fails if the branch moved
    #[serde(rename = "previousCommit", default)]
    pub previous_commit: Option<Reference>,
}

impl NewCommit {
    pub fn comment(&self) -> Option<String> {
        self.comment.clone().or_else(|| self.description.clone())
    }
}
