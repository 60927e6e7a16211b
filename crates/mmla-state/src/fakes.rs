//! In-memory fakes for storage traits (testing only)
//!
//! `MemorySpecStore` and `MemoryAuditTrail` satisfy the trait contracts
//! without touching the filesystem.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::SpecDocument;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemorySpecStore
// ---------------------------------------------------------------------------

/// In-memory specification store. The mutex is the single writer; the
/// revision check gives callers compare-and-swap semantics.
#[derive(Debug, Default)]
pub struct MemorySpecStore {
    document: Mutex<Option<SpecDocument>>,
}

impl MemorySpecStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `document` (its revision is kept as-is).
    pub fn with_document(document: SpecDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }
}

#[async_trait]
impl SpecStore for MemorySpecStore {
    async fn load(&self) -> StorageResult<SpecDocument> {
        let guard = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clone().ok_or_else(|| StorageError::DocumentMissing {
            location: "memory".to_string(),
        })
    }

    async fn compare_and_swap(
        &self,
        expected_revision: u64,
        mut document: SpecDocument,
    ) -> StorageResult<u64> {
        let mut guard = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        let actual = guard.as_ref().map(|d| d.revision).ok_or_else(|| {
            StorageError::DocumentMissing {
                location: "memory".to_string(),
            }
        })?;
        if actual != expected_revision {
            return Err(StorageError::RevisionConflict {
                expected: expected_revision,
                actual,
            });
        }
        document.revision = actual + 1;
        *guard = Some(document);
        Ok(actual + 1)
    }

    async fn replace(&self, mut document: SpecDocument) -> StorageResult<u64> {
        let mut guard = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        let next = guard.as_ref().map_or(1, |d| d.revision + 1);
        document.revision = next;
        *guard = Some(document);
        Ok(next)
    }

    async fn update(
        &self,
        edit: &mut (dyn for<'d> FnMut(&'d mut SpecDocument) -> bool + Send),
    ) -> StorageResult<Option<u64>> {
        let mut guard = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = guard.as_ref() else {
            return Err(StorageError::DocumentMissing {
                location: "memory".to_string(),
            });
        };
        let next = current.revision + 1;
        let mut document = current.clone();
        if !edit(&mut document) {
            return Ok(None);
        }
        document.revision = next;
        *guard = Some(document);
        Ok(Some(next))
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditTrail
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryAuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditTrail for MemoryAuditTrail {
    async fn record(&self, entry: AuditEntry) -> StorageResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }

    async fn entries(&self, node_id: Option<&str>) -> StorageResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .filter(|e| node_id.map_or(true, |id| e.node_id == id))
            .cloned()
            .collect())
    }
}
