use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// JSON-LD style pointer to another record, serialized as `{"@id": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "@id")]
    pub id: Id,
}

impl Reference {
    pub fn new(id: impl Into<Id>) -> Self {
        Self { id: id.into() }
    }
}

impl From<&Id> for Reference {
    fn from(id: &Id) -> Self {
        Self { id: id.clone() }
    }
}

/// Current time as an ISO 8601 string, the format every record stores
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
