//! Storage trait definitions for MMLA
//!
//! These traits define the persistence seams:
//! - `SpecStore`: whole-document specification storage with optimistic
//!   compare-and-swap on the document revision
//! - `AuditTrail`: append-only record of failed validation attempts
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::SpecDocument;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of a code sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        ContentDigest(hex::encode(Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SpecStore
// ---------------------------------------------------------------------------

/// Ceiling for the pause between `update` retries after a lost race.
pub const MAX_UPDATE_BACKOFF: Duration = Duration::from_millis(50);

/// Durable home of the specification document.
///
/// Guarantees:
/// - `load()` returns the latest committed document; its `revision` field is
///   the version to pass back to `compare_and_swap`.
/// - `compare_and_swap(expected, doc)` commits only if the stored revision is
///   still `expected`, otherwise fails with `StorageError::RevisionConflict`
///   and leaves the store untouched.
/// - `update(edit)` never loses a concurrent commit and never gives up on
///   contention.
/// - Every commit bumps the revision by exactly one.
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Read the current document. `StorageError::DocumentMissing` if none.
    async fn load(&self) -> StorageResult<SpecDocument>;

    /// Commit `document` if the stored revision equals `expected_revision`.
    /// Returns the new revision.
    async fn compare_and_swap(
        &self,
        expected_revision: u64,
        document: SpecDocument,
    ) -> StorageResult<u64>;

    /// Commit `document` regardless of the stored revision (fresh compile).
    /// Returns the new revision.
    async fn replace(&self, document: SpecDocument) -> StorageResult<u64>;

    /// Read-modify-write of the current document.
    ///
    /// `edit` returns `false` to leave the store untouched (`Ok(None)`);
    /// otherwise the edited document is committed and its revision returned.
    /// `edit` may run more than once and only its last run is committed.
    ///
    /// The default re-reads and retries on every `RevisionConflict`, with
    /// capped exponential backoff. Backends with a writer lock override it to
    /// hold that lock across the whole cycle.
    async fn update(
        &self,
        edit: &mut (dyn for<'d> FnMut(&'d mut SpecDocument) -> bool + Send),
    ) -> StorageResult<Option<u64>> {
        let mut backoff = Duration::from_millis(1);
        loop {
            let mut document = self.load().await?;
            let expected = document.revision;
            if !edit(&mut document) {
                return Ok(None);
            }
            match self.compare_and_swap(expected, document).await {
                Ok(revision) => return Ok(Some(revision)),
                Err(e) if e.is_conflict() => {
                    debug!(expected, error = %e, "update lost a write race, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_UPDATE_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

/// One failed validation attempt, kept for later analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub node_id: String,
    pub attempt: u32,
    pub code_digest: ContentDigest,
    pub code: String,
    pub errors: Vec<String>,
}

impl AuditEntry {
    pub fn new(
        session_id: impl Into<String>,
        node_id: impl Into<String>,
        attempt: u32,
        code: impl Into<String>,
        errors: Vec<String>,
    ) -> Self {
        let code = code.into();
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            node_id: node_id.into(),
            attempt,
            code_digest: ContentDigest::from_bytes(code.as_bytes()),
            code,
            errors,
        }
    }
}

/// Append-only sink for failed attempts.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> StorageResult<()>;

    /// Entries in append order, optionally restricted to one node.
    async fn entries(&self, node_id: Option<&str>) -> StorageResult<Vec<AuditEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_sha256_hex() {
        let a = ContentDigest::from_bytes(b"def f(): pass");
        let b = ContentDigest::from_bytes(b"def f(): pass");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn digest_rejects_non_hex() {
        let err = ContentDigest::try_from("xyz".to_string()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDigest { .. }));
    }

    #[test]
    fn audit_entry_digests_its_code() {
        let entry = AuditEntry::new("s-1", "leaf_login", 2, "x = 1", vec!["L1".into()]);
        assert_eq!(entry.code_digest, ContentDigest::from_bytes(b"x = 1"));
        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
