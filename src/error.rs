use crate::model::Id;

pub type StoreResult<T> = Result<T, StoreError>;

/// Every failure the model store reports to its callers.
///
/// Validation failures reject the whole commit batch; `Backend` wraps
/// infrastructure errors coming out of a store implementation.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("unknown element type '{0}'")]
    UnknownType(String),
    #[error("element type '{0}' is abstract and cannot be instantiated")]
    AbstractType(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("element '{0}' already exists")]
    DuplicateElement(Id),
    #[error("element '{0}' does not exist")]
    UnknownElement(Id),
    #[error("change {index}: {source}")]
    InvalidChange {
        index: usize,
        #[source]
        source: Box<StoreError>,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn malformed(message: impl Into<String>) -> Self {
        StoreError::Malformed(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    /// Attach the position of the offending change entry
    pub fn at_change(self, index: usize) -> Self {
        match self {
            StoreError::InvalidChange { .. } | StoreError::Backend(_) => self,
            other => StoreError::InvalidChange {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Stable machine-readable code, returned alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::UnknownType(_) => "UNKNOWN_TYPE",
            StoreError::AbstractType(_) => "ABSTRACT_TYPE",
            StoreError::Malformed(_) => "MALFORMED_PAYLOAD",
            StoreError::DuplicateElement(_) => "DUPLICATE_ELEMENT",
            StoreError::UnknownElement(_) => "UNKNOWN_ELEMENT",
            StoreError::InvalidChange { source, .. } => source.code(),
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::Backend(_) => "INTERNAL_ERROR",
        }
    }

    /// True when the caller sent something the store refuses to accept
    pub fn is_client_error(&self) -> bool {
        !matches!(self, StoreError::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_change_keeps_inner_code() {
        let err = StoreError::UnknownType("Gizmo".to_string()).at_change(3);
        assert_eq!(err.code(), "UNKNOWN_TYPE");
        assert_eq!(err.to_string(), "change 3: unknown element type 'Gizmo'");

        // Wrapping twice keeps the first index
        let err = err.at_change(7);
        assert!(err.to_string().starts_with("change 3:"));
    }

    #[test]
    fn test_backend_errors_are_not_client_errors() {
        let err = StoreError::from(anyhow::anyhow!("connection reset"));
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(!err.is_client_error());
        assert!(StoreError::not_found("Project 'x'").is_client_error());
    }
}
