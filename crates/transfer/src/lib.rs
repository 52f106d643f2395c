//! Resumable chunked uploads.
//!
//! A client opens a session, uploads fixed-size chunks in any order (with
//! retries), and asks for completion. Session state lives in a
//! [`BlobStore`](orderdesk_blob_store::BlobStore) directory per upload:
//!
//! ```text
//! chunks/<upload_id>/metadata.json
//! chunks/<upload_id>/chunk_<index>.tmp
//! ```
//!
//! The [`MergeEngine`] stitches chunks in index order into the final file
//! and verifies its byte size; the [`SessionSweeper`] reclaims abandoned
//! sessions.

mod clock;
mod completeness;
mod limits;
mod merge;
mod receiver;
mod session;
mod sweeper;

pub use clock::{Clock, IdSource, ManualClock, RandomIds, SequentialIds, SystemClock};
pub use completeness::is_complete;
pub use limits::{UploadLimits, file_extension};
pub use merge::{MergeEngine, MergeOutcome};
pub use receiver::{ChunkReceipt, ChunkReceiver};
pub use session::{SessionStore, UploadMetadata, is_valid_session_id};
pub use sweeper::{SessionSweeper, SweepReport};

use orderdesk_blob_store::StoreError;

/// Store directory holding one subdirectory per upload session.
pub const CHUNKS_DIR: &str = "chunks";

/// Errors produced by the upload pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("upload session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid chunk index {index}: session has {total_chunks} chunks")]
    InvalidChunkIndex { index: i64, total_chunks: u32 },

    #[error("chunk of {size} bytes exceeds the {max} byte limit")]
    ChunkTooLarge { size: u64, max: u64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("upload incomplete: {received} of {total_chunks} chunks received")]
    UploadIncomplete { received: usize, total_chunks: u32 },

    #[error("missing chunk {0}")]
    MissingChunk(u32),

    #[error("size mismatch after merge: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("completion already in progress for upload {0}")]
    CompletionInProgress(String),

    #[error("corrupt metadata for upload {upload_id}: {source}")]
    CorruptMetadata {
        upload_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
