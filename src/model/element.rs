use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::model::{generate_id, ElementKind, Id, BOOLEAN_ATTRIBUTES, STRING_ATTRIBUTES};

/// One immutable version of a model element.
///
/// On the wire this is a flat JSON-LD object: `@id`, `@type`, then every
/// attribute exactly as the client sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "@id")]
    pub id: Id,
    #[serde(rename = "@type")]
    pub kind: ElementKind,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Element {
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").and_then(Value::as_str)
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Build an element from a client payload, validating it against the
    /// kind registry and the kind's attribute schema.
    ///
    /// `identity` is the id from the change entry's `identity` field; it must
    /// agree with the payload's own `@id` if both are present. With neither,
    /// a fresh id is assigned.
    pub fn from_payload(payload: Value, identity: Option<&Id>) -> StoreResult<Self> {
        let Value::Object(mut attributes) = payload else {
            return Err(StoreError::malformed("payload must be a JSON object"));
        };

        let kind = match attributes.remove("@type") {
            Some(Value::String(tag)) => ElementKind::instantiable(&tag)?,
            Some(_) => return Err(StoreError::malformed("'@type' must be a string")),
            None => return Err(StoreError::malformed("payload is missing '@type'")),
        };

        let payload_id = match attributes.remove("@id") {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id),
            Some(Value::Null) | None => None,
            Some(_) => return Err(StoreError::malformed("'@id' must be a non-empty string")),
        };

        let id = match (payload_id, identity) {
            (Some(own), Some(declared)) if &own != declared => {
                return Err(StoreError::malformed(format!(
                    "payload '@id' {} does not match identity {}",
                    own, declared
                )))
            }
            (Some(own), _) => own,
            (None, Some(declared)) if declared.trim().is_empty() => {
                return Err(StoreError::malformed("'identity.@id' must be a non-empty string"))
            }
            (None, Some(declared)) => declared.clone(),
            (None, None) => generate_id(),
        };

        validate_attributes(kind, &attributes)?;

        Ok(Self {
            id,
            kind,
            attributes,
        })
    }
}

fn validate_attributes(kind: ElementKind, attributes: &Map<String, Value>) -> StoreResult<()> {
    for (name, value) in attributes {
        if name.starts_with('@') {
            return Err(StoreError::malformed(format!(
                "'{}' is a reserved key",
                name
            )));
        }

        if STRING_ATTRIBUTES.contains(&name.as_str()) && !(value.is_string() || value.is_null()) {
            return Err(StoreError::malformed(format!(
                "attribute '{}' must be a string",
                name
            )));
        }

        if BOOLEAN_ATTRIBUTES.contains(&name.as_str()) && !(value.is_boolean() || value.is_null()) {
            return Err(StoreError::malformed(format!(
                "attribute '{}' must be a boolean",
                name
            )));
        }

        if kind.is_reference_attribute(name) && !is_reference_value(value) {
            return Err(StoreError::malformed(format!(
                "attribute '{}' of {} must reference elements by id",
                name, kind
            )));
        }
    }

    Ok(())
}

/// Accepts `"id"`, `{"@id": "id"}`, null, or an array of ids/objects.
/// Targets are never looked up: dangling references are allowed.
fn is_reference_value(value: &Value) -> bool {
    fn single(value: &Value) -> bool {
        match value {
            Value::String(id) => !id.is_empty(),
            Value::Object(map) => matches!(map.get("@id"), Some(Value::String(id)) if !id.is_empty()),
            _ => false,
        }
    }

    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().all(single),
        other => single(other),
    }
}
