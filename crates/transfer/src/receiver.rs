use tracing::debug;

use orderdesk_blob_store::StoreError;

use crate::TransferError;
use crate::limits::UploadLimits;
use crate::session::{SessionStore, chunk_key};

/// Result of storing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReceipt {
    /// Every index received so far, ascending.
    pub received_chunks: Vec<u32>,
    pub total_chunks: u32,
}

impl ChunkReceipt {
    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() == self.total_chunks as usize
    }
}

/// Accepts chunk payloads into an open session.
#[derive(Clone)]
pub struct ChunkReceiver {
    sessions: SessionStore,
    limits: UploadLimits,
}

impl ChunkReceiver {
    pub fn new(sessions: SessionStore, limits: UploadLimits) -> Self {
        Self { sessions, limits }
    }

    /// Stores chunk `index` of session `upload_id`.
    ///
    /// Re-sending an index overwrites the stored bytes (last write wins) and
    /// leaves the received set unchanged. A session deleted while the chunk
    /// is in flight yields [`TransferError::SessionNotFound`] and nothing is
    /// left behind.
    pub fn store_chunk(
        &self,
        upload_id: &str,
        index: i64,
        bytes: &[u8],
    ) -> Result<ChunkReceipt, TransferError> {
        self.limits.validate_chunk_len(bytes.len())?;

        let meta = self
            .sessions
            .read(upload_id)?
            .ok_or_else(|| TransferError::SessionNotFound(upload_id.to_string()))?;

        let index = u32::try_from(index)
            .ok()
            .filter(|i| *i < meta.total_chunks)
            .ok_or(TransferError::InvalidChunkIndex {
                index,
                total_chunks: meta.total_chunks,
            })?;

        match self.sessions.blobs().put(&chunk_key(upload_id, index), bytes) {
            Ok(()) => {}
            Err(StoreError::MissingParent(_)) => {
                return Err(TransferError::SessionNotFound(upload_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let now = self.sessions.clock().now();
        let meta = self.sessions.update(upload_id, |meta| {
            meta.received_chunks.insert(index);
            meta.updated_at = now;
            Ok(())
        })?;

        debug!(
            upload_id,
            chunk_index = index,
            size = bytes.len(),
            received = meta.received_chunks.len(),
            total = meta.total_chunks,
            "chunk stored"
        );

        Ok(ChunkReceipt {
            received_chunks: meta.received(),
            total_chunks: meta.total_chunks,
        })
    }
}
