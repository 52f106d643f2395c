use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use orderdesk_blob_store::{BlobStore, StoreError};

use crate::clock::{Clock, IdSource};
use crate::{CHUNKS_DIR, TransferError};

const METADATA_FILE: &str = "metadata.json";

/// Longest accepted session id.
const MAX_SESSION_ID_LEN: usize = 64;

/// Persisted state of one upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub upload_id: String,
    /// Client-supplied name; untrusted, used for the extension only.
    pub filename: String,
    pub total_chunks: u32,
    /// Expected byte size of the merged file.
    pub file_size: u64,
    /// Indices stored so far. Only ever grows.
    pub received_chunks: BTreeSet<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set while a completion owns the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_lease_until: Option<DateTime<Utc>>,
}

impl UploadMetadata {
    /// Returns `true` once every index in `0..total_chunks` is received.
    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() == self.total_chunks as usize
    }

    /// Received indices, ascending.
    pub fn received(&self) -> Vec<u32> {
        self.received_chunks.iter().copied().collect()
    }

    /// Indices not received yet, ascending.
    pub fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received_chunks.contains(i))
            .collect()
    }

    /// Age relative to `now`, measured from creation.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

/// Returns `true` if `id` has the shape of a session id (one safe path segment).
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub(crate) fn session_dir(id: &str) -> String {
    format!("{CHUNKS_DIR}/{id}")
}

pub(crate) fn metadata_key(id: &str) -> String {
    format!("{CHUNKS_DIR}/{id}/{METADATA_FILE}")
}

pub(crate) fn chunk_key(id: &str, index: u32) -> String {
    format!("{CHUNKS_DIR}/{id}/chunk_{index}.tmp")
}

/// Per-session mutexes serializing metadata read-modify-write in this process.
#[derive(Debug, Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    fn get(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    fn forget(&self, id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(id);
    }
}

/// Persists upload session metadata on top of a [`BlobStore`].
///
/// Cheap to clone; clones share the store, clock and lock table.
#[derive(Clone)]
pub struct SessionStore {
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    locks: Arc<SessionLocks>,
}

impl SessionStore {
    pub fn new(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, ids: Arc<dyn IdSource>) -> Self {
        Self {
            blobs,
            clock,
            ids,
            locks: Arc::new(SessionLocks::default()),
        }
    }

    /// The underlying blob store.
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// The injected clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The injected id source.
    pub fn ids(&self) -> &Arc<dyn IdSource> {
        &self.ids
    }

    /// Opens a new session with an empty received set.
    ///
    /// Counts are assumed validated by the caller.
    pub fn create(
        &self,
        filename: &str,
        total_chunks: u32,
        file_size: u64,
    ) -> Result<UploadMetadata, TransferError> {
        let upload_id = self.ids.session_id();
        let dir = session_dir(&upload_id);
        self.blobs.create_dir(&dir)?;

        let now = self.clock.now();
        let meta = UploadMetadata {
            upload_id: upload_id.clone(),
            filename: filename.to_string(),
            total_chunks,
            file_size,
            received_chunks: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            completion_lease_until: None,
        };

        if let Err(e) = self.write(&meta) {
            let _ = self.blobs.delete_dir(&dir);
            return Err(e);
        }

        info!(
            upload_id = %upload_id,
            filename,
            total_chunks,
            file_size,
            "upload session created"
        );
        Ok(meta)
    }

    /// Loads session metadata. `Ok(None)` means the session does not exist.
    pub fn read(&self, id: &str) -> Result<Option<UploadMetadata>, TransferError> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }
        let Some(bytes) = self.blobs.get(&metadata_key(id))? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| TransferError::CorruptMetadata {
                upload_id: id.to_string(),
                source,
            })
    }

    /// Read-modify-write of session metadata under the session lock.
    ///
    /// Never recreates a deleted session: a missing session yields
    /// [`TransferError::SessionNotFound`] and `mutate` is not called.
    pub fn update<F>(&self, id: &str, mutate: F) -> Result<UploadMetadata, TransferError>
    where
        F: FnOnce(&mut UploadMetadata) -> Result<(), TransferError>,
    {
        let lock = self.locks.get(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut meta = self
            .read(id)?
            .ok_or_else(|| TransferError::SessionNotFound(id.to_string()))?;
        mutate(&mut meta)?;
        self.write(&meta)?;
        Ok(meta)
    }

    /// Removes the session directory (metadata and chunks) in one step.
    ///
    /// Returns `false` if the session did not exist.
    pub fn delete(&self, id: &str) -> Result<bool, TransferError> {
        if !is_valid_session_id(id) {
            return Ok(false);
        }
        self.remove_dir(id)
    }

    /// Deletes a listed session directory whose name may not be a valid id.
    pub(crate) fn remove_dir(&self, name: &str) -> Result<bool, TransferError> {
        let removed = self.blobs.delete_dir(&session_dir(name))?;
        self.locks.forget(name);
        if removed {
            debug!(upload_id = name, "upload session directory removed");
        }
        Ok(removed)
    }

    /// Names of every session directory currently in the store.
    pub fn list(&self) -> Result<Vec<String>, TransferError> {
        Ok(self.blobs.list_dirs(CHUNKS_DIR)?)
    }

    /// Claims the session for completion until `now + lease`.
    ///
    /// Fails with [`TransferError::CompletionInProgress`] while another
    /// unexpired claim is held.
    pub fn begin_completion(
        &self,
        id: &str,
        lease: Duration,
    ) -> Result<UploadMetadata, TransferError> {
        let now = self.clock.now();
        self.update(id, |meta| {
            if meta.completion_lease_until.is_some_and(|until| until > now) {
                return Err(TransferError::CompletionInProgress(id.to_string()));
            }
            meta.completion_lease_until = Some(now + lease);
            Ok(())
        })
    }

    /// Releases a completion claim so the client can retry.
    pub fn end_completion(&self, id: &str) -> Result<(), TransferError> {
        self.update(id, |meta| {
            meta.completion_lease_until = None;
            Ok(())
        })?;
        Ok(())
    }

    fn write(&self, meta: &UploadMetadata) -> Result<(), TransferError> {
        let json = serde_json::to_vec_pretty(meta)?;
        match self.blobs.put(&metadata_key(&meta.upload_id), &json) {
            Ok(()) => Ok(()),
            Err(StoreError::MissingParent(_)) => {
                Err(TransferError::SessionNotFound(meta.upload_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
