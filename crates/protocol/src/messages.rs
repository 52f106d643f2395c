use serde::{Deserialize, Serialize};

use crate::types::TargetType;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Body of `POST /uploads/init`.
///
/// Counts are signed so out-of-range values reach validation instead of
/// failing deserialization with an opaque message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitUploadRequest {
    pub filename: String,
    pub total_chunks: i64,
    pub file_size: i64,
}

/// Body of `POST /uploads/{id}/complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    pub target_type: TargetType,
    pub target_id: u64,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// A freshly opened upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitUploadResponse {
    pub upload_id: String,
    /// Chunk size the client should slice with, in bytes.
    pub chunk_size: u64,
}

/// Acknowledges one stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAck {
    pub success: bool,
    /// Every index received so far, ascending.
    pub received_chunks: Vec<u32>,
    pub total_chunks: u32,
}

/// Full session projection returned by `GET /uploads/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    pub upload_id: String,
    pub filename: String,
    pub total_chunks: u32,
    pub file_size: u64,
    pub received_chunks: Vec<u32>,
    pub is_complete: bool,
    /// RFC 3339 timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
}

/// Locator of a finalized, attached file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    /// Path relative to the public storage root.
    pub file_path: String,
    /// Public URL the file is served from.
    pub url: String,
}
