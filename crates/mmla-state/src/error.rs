//! Error types for mmla-state

use thiserror::Error;

/// Errors produced by specification stores and audit trails.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No specification document has been written yet
    #[error("specification document not found: {location}")]
    DocumentMissing { location: String },

    /// Optimistic write lost against a concurrent writer
    #[error("revision conflict: expected {expected}, found {actual}")]
    RevisionConflict { expected: u64, actual: u64 },

    /// Digest string was not 64 hex characters
    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Document or audit entry could not be (de)serialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// `true` when retrying the read-modify-write may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RevisionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_retryable() {
        let err = StorageError::RevisionConflict {
            expected: 3,
            actual: 4,
        };
        assert!(err.is_conflict());
        let msg = err.to_string();
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("found 4"));
    }

    #[test]
    fn missing_document_is_not_retryable() {
        let err = StorageError::DocumentMissing {
            location: "mmla_spec.json".to_string(),
        };
        assert!(!err.is_conflict());
        assert!(err.to_string().contains("mmla_spec.json"));
    }
}
