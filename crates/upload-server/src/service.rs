//! Upload orchestration.
//!
//! [`UploadService`] drives one session through its lifecycle:
//!
//! ```text
//! init -> OPEN -> chunk(i)* -> complete -> MERGING -> DONE (session deleted)
//!                                              \-> OPEN on failure (retryable)
//! OPEN -> cancel -> DELETED
//! ```
//!
//! Storage work is synchronous and runs on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use tracing::{info, warn};

use orderdesk_blob_store::BlobStore;
use orderdesk_protocol::TargetType;
use orderdesk_protocol::messages::{
    ChunkAck, CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest,
    InitUploadResponse, UploadStatusResponse,
};
use orderdesk_transfer::{
    ChunkReceiver, Clock, IdSource, MergeEngine, RandomIds, SessionStore, SessionSweeper,
    SweepReport, SystemClock, TransferError, UploadMetadata, file_extension, is_complete,
};

use crate::config::ServiceConfig;
use crate::error::{ApiError, ApiResult};
use crate::{PUBLIC_DIR, public_key};
use crate::targets::{DocumentTargets, NewOrderDocument};

/// Upload lifecycle operations shared by every request handler.
#[derive(Clone)]
pub struct UploadService {
    sessions: SessionStore,
    receiver: ChunkReceiver,
    merger: MergeEngine,
    sweeper: SessionSweeper,
    targets: Arc<dyn DocumentTargets>,
    config: Arc<ServiceConfig>,
}

impl UploadService {
    /// Creates a service using the system clock and random ids.
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        targets: Arc<dyn DocumentTargets>,
        config: ServiceConfig,
    ) -> Self {
        Self::with_capabilities(
            blobs,
            targets,
            config,
            Arc::new(SystemClock),
            Arc::new(RandomIds),
        )
    }

    /// Creates a service with an injected clock and id source.
    pub fn with_capabilities(
        blobs: Arc<dyn BlobStore>,
        targets: Arc<dyn DocumentTargets>,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let sessions = SessionStore::new(blobs, clock, ids);
        Self {
            receiver: ChunkReceiver::new(sessions.clone(), config.limits.clone()),
            merger: MergeEngine::new(sessions.clone()),
            sweeper: SessionSweeper::new(sessions.clone()),
            sessions,
            targets,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Directory finalized files are written to and served from.
    pub fn public_root(&self) -> ApiResult<PathBuf> {
        self.sessions
            .blobs()
            .path(PUBLIC_DIR)
            .map_err(|e| ApiError::from(TransferError::from(e)))
    }

    /// Opens a session after checking the boundary limits.
    pub async fn initialize(&self, req: InitUploadRequest) -> ApiResult<InitUploadResponse> {
        let (total_chunks, file_size) =
            self.config
                .limits
                .validate_init(&req.filename, req.total_chunks, req.file_size)?;

        let sessions = self.sessions.clone();
        let filename = req.filename;
        let meta = blocking(move || sessions.create(&filename, total_chunks, file_size)).await?;

        Ok(InitUploadResponse {
            upload_id: meta.upload_id,
            chunk_size: self.config.limits.chunk_size,
        })
    }

    /// Stores one chunk; re-sending an index replaces its bytes.
    pub async fn store_chunk(
        &self,
        upload_id: String,
        index: i64,
        bytes: Bytes,
    ) -> ApiResult<ChunkAck> {
        let receiver = self.receiver.clone();
        let receipt = blocking(move || receiver.store_chunk(&upload_id, index, &bytes)).await?;
        Ok(ChunkAck {
            success: true,
            received_chunks: receipt.received_chunks,
            total_chunks: receipt.total_chunks,
        })
    }

    /// Current session state.
    pub async fn status(&self, upload_id: String) -> ApiResult<UploadStatusResponse> {
        let meta = self.load(upload_id).await?;
        Ok(UploadStatusResponse {
            is_complete: meta.is_complete(),
            received_chunks: meta.received(),
            created_at: meta.created_at.to_rfc3339(),
            updated_at: meta.updated_at.to_rfc3339(),
            upload_id: meta.upload_id,
            filename: meta.filename,
            total_chunks: meta.total_chunks,
            file_size: meta.file_size,
        })
    }

    /// Merges a fully received session, attaches the result to its target
    /// and deletes the session.
    ///
    /// Any failure leaves the session in place so the call can be retried.
    pub async fn complete(
        &self,
        upload_id: String,
        req: CompleteUploadRequest,
        uploaded_by: Option<u64>,
    ) -> ApiResult<CompleteUploadResponse> {
        let meta = self.load(upload_id.clone()).await?;
        let sessions = self.sessions.clone();
        let id = upload_id.clone();
        let total_chunks = meta.total_chunks;
        if !blocking(move || is_complete(&sessions, &id, total_chunks)).await? {
            return Err(TransferError::UploadIncomplete {
                received: meta.received_chunks.len(),
                total_chunks: meta.total_chunks,
            }
            .into());
        }

        if !self.targets.exists(req.target_type, req.target_id).await? {
            return Err(ApiError::NotFound(format!(
                "{} {}",
                req.target_type.entity(),
                req.target_id
            )));
        }

        let lease = chrono::Duration::from_std(self.config.completion_lease_for(meta.file_size))
            .map_err(|e| ApiError::Internal(format!("invalid completion lease: {e}")))?;
        let sessions = self.sessions.clone();
        let id = upload_id.clone();
        blocking(move || sessions.begin_completion(&id, lease)).await?;

        match self.finalize(&meta, &req, uploaded_by).await {
            Ok(response) => Ok(response),
            Err(e) => {
                let sessions = self.sessions.clone();
                let id = upload_id.clone();
                if let Err(release) = blocking(move || sessions.end_completion(&id)).await {
                    warn!(upload_id = %upload_id, "failed to release completion lease: {release}");
                }
                Err(e)
            }
        }
    }

    async fn finalize(
        &self,
        meta: &UploadMetadata,
        req: &CompleteUploadRequest,
        uploaded_by: Option<u64>,
    ) -> ApiResult<CompleteUploadResponse> {
        let stem = self.sessions.ids().file_stem();
        let stored_name = match file_extension(&meta.filename) {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        };
        let file_path = format!("{}/{}", req.target_type.namespace(), stored_name);
        let key = public_key(&file_path);

        let merger = self.merger.clone();
        let id = meta.upload_id.clone();
        let dest = key.clone();
        let outcome = blocking(move || merger.merge(&id, &dest)).await?;

        let mime_type = mime_guess::from_path(&file_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let url = self.config.public_url(&file_path);

        let attached = match req.target_type {
            TargetType::OrderDocument => self
                .targets
                .attach_order_document(NewOrderDocument {
                    order_id: req.target_id,
                    filename: stored_name,
                    original_name: meta.filename.clone(),
                    file_path: file_path.clone(),
                    file_size: outcome.bytes,
                    mime_type: mime_type.clone(),
                    uploaded_by,
                    url: url.clone(),
                })
                .await
                .map(|_| ()),
            TargetType::ProductDocument => {
                self.targets
                    .replace_product_document(req.target_id, file_path.clone())
                    .await
            }
        };
        if let Err(e) = attached {
            let blobs = Arc::clone(self.sessions.blobs());
            let orphan = key.clone();
            if let Err(cleanup) =
                blocking(move || blobs.delete(&orphan).map_err(TransferError::from)).await
            {
                warn!(key = %key, "failed to remove unattached file: {cleanup}");
            }
            return Err(e.into());
        }

        let sessions = self.sessions.clone();
        let id = meta.upload_id.clone();
        if let Err(e) = blocking(move || sessions.delete(&id)).await {
            warn!(upload_id = %meta.upload_id, "failed to delete completed session: {e}");
        }

        info!(
            upload_id = %meta.upload_id,
            target_type = %req.target_type,
            target_id = req.target_id,
            file_path = %file_path,
            bytes = outcome.bytes,
            mime_type = %mime_type,
            "upload completed"
        );
        Ok(CompleteUploadResponse { file_path, url })
    }

    /// Deletes a session. Cancelling an unknown session succeeds.
    pub async fn cancel(&self, upload_id: String) -> ApiResult<()> {
        let sessions = self.sessions.clone();
        let id = upload_id.clone();
        let removed = blocking(move || sessions.delete(&id)).await?;
        if removed {
            info!(upload_id = %upload_id, "upload cancelled");
        }
        Ok(())
    }

    /// Removes sessions older than `max_age` and orphaned session directories.
    pub async fn sweep(&self, max_age: Duration) -> ApiResult<SweepReport> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| ApiError::Internal(format!("invalid session max age: {e}")))?;
        let sweeper = self.sweeper.clone();
        blocking(move || sweeper.sweep(max_age)).await
    }

    async fn load(&self, upload_id: String) -> ApiResult<UploadMetadata> {
        let sessions = self.sessions.clone();
        let id = upload_id.clone();
        blocking(move || sessions.read(&id))
            .await?
            .ok_or_else(|| TransferError::SessionNotFound(upload_id).into())
    }
}

/// Runs synchronous storage work on the blocking pool.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, TransferError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("storage task failed: {e}")))?
        .map_err(ApiError::from)
}
