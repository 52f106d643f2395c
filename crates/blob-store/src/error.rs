//! Error types for blob storage.

/// Errors produced by a [`BlobStore`](crate::BlobStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("parent directory missing for key: {0}")]
    MissingParent(String),
}
