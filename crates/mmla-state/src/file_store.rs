//! Filesystem-backed stores.
//!
//! `JsonFileSpecStore` keeps the whole specification document in one pretty
//! printed JSON file. Every write lands atomically (temp file in the same
//! directory, then rename), so readers never observe a half-written
//! document and take no lock.
//!
//! Writers are serialized twice: an async mutex per store handle, then an
//! exclusive `flock` on a sidecar `<file>.lock` that is held from the
//! revision check through the rename. The file lock covers other handles
//! and other processes on the same document.
//!
//! `JsonlAuditTrail` appends one JSON object per line.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::fcntl::{Flock, FlockArg};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::SpecDocument;
use crate::storage_traits::{AuditEntry, AuditTrail, SpecStore, StorageResult};

/// Single-file JSON specification store.
#[derive(Debug)]
pub struct JsonFileSpecStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSpecStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file carrying the cross-process writer lock.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn missing(&self) -> StorageError {
        StorageError::DocumentMissing {
            location: self.path.display().to_string(),
        }
    }

    fn read_document(&self) -> StorageResult<SpecDocument> {
        let bytes = fs::read(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                self.missing()
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn stored_document(&self) -> StorageResult<Option<SpecDocument>> {
        match self.read_document() {
            Ok(doc) => Ok(Some(doc)),
            Err(StorageError::DocumentMissing { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_document(&self, document: &SpecDocument) -> StorageResult<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, document)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Blocks (on the blocking pool) until this process owns the sidecar
    /// lock. Dropping the returned guard releases it.
    async fn acquire_file_lock(&self) -> StorageResult<Flock<File>> {
        let dir = self.parent_dir();
        let lock_path = self.lock_path();
        let locked = tokio::task::spawn_blocking(move || -> std::io::Result<Flock<File>> {
            fs::create_dir_all(&dir)?;
            let file = fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            Flock::lock(file, FlockArg::LockExclusive)
                .map_err(|(_, errno)| std::io::Error::from(errno))
        })
        .await
        .map_err(|join| StorageError::Io(std::io::Error::other(join)))?;
        Ok(locked?)
    }

    /// Run `critical` with both writer locks held.
    async fn with_writer_lock<T>(
        &self,
        critical: impl FnOnce(&Self) -> StorageResult<T> + Send,
    ) -> StorageResult<T> {
        let _local = self.write_lock.lock().await;
        let _file = self.acquire_file_lock().await?;
        critical(self)
    }
}

#[async_trait]
impl SpecStore for JsonFileSpecStore {
    async fn load(&self) -> StorageResult<SpecDocument> {
        self.read_document()
    }

    async fn compare_and_swap(
        &self,
        expected_revision: u64,
        mut document: SpecDocument,
    ) -> StorageResult<u64> {
        self.with_writer_lock(move |store| {
            let actual = store
                .stored_document()?
                .ok_or_else(|| store.missing())?
                .revision;
            if actual != expected_revision {
                return Err(StorageError::RevisionConflict {
                    expected: expected_revision,
                    actual,
                });
            }
            document.revision = actual + 1;
            store.write_document(&document)?;
            debug!(path = %store.path.display(), revision = document.revision, "spec document committed");
            Ok(document.revision)
        })
        .await
    }

    async fn replace(&self, mut document: SpecDocument) -> StorageResult<u64> {
        self.with_writer_lock(move |store| {
            document.revision = store.stored_document()?.map_or(1, |d| d.revision + 1);
            store.write_document(&document)?;
            debug!(path = %store.path.display(), revision = document.revision, "spec document replaced");
            Ok(document.revision)
        })
        .await
    }

    async fn update(
        &self,
        edit: &mut (dyn for<'d> FnMut(&'d mut SpecDocument) -> bool + Send),
    ) -> StorageResult<Option<u64>> {
        self.with_writer_lock(move |store| {
            let mut document = store.stored_document()?.ok_or_else(|| store.missing())?;
            let next = document.revision + 1;
            if !edit(&mut document) {
                return Ok(None);
            }
            document.revision = next;
            store.write_document(&document)?;
            debug!(path = %store.path.display(), revision = next, "spec document updated");
            Ok(Some(next))
        })
        .await
    }
}

/// Newline-delimited JSON audit trail.
#[derive(Debug)]
pub struct JsonlAuditTrail {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonlAuditTrail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditTrail for JsonlAuditTrail {
    async fn record(&self, entry: AuditEntry) -> StorageResult<()> {
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let _guard = self.append_lock.lock().await;
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        debug!(
            node_id = %entry.node_id,
            attempt = entry.attempt,
            digest = %entry.code_digest.short(),
            "audit entry recorded"
        );
        Ok(())
    }

    async fn entries(&self, node_id: Option<&str>) -> StorageResult<Vec<AuditEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(&line)?;
            if node_id.map_or(true, |id| entry.node_id == id) {
                out.push(entry);
            }
        }
        Ok(out)
    }
}
