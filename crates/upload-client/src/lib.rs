//! Client for the orderdesk chunked upload API.
//!
//! [`UploadApi`] maps one-to-one onto the HTTP endpoints. [`ChunkedUploader`]
//! drives a whole file through them: it slices the file, retries failed
//! chunks with backoff, can be paused, resumed and cancelled, and reports
//! progress through callbacks.

mod api;
mod chunked;
mod error;
mod progress;
mod uploader;

pub use api::UploadApi;
pub use chunked::{ChunkReader, calculate_total_chunks, format_file_size};
pub use error::ClientError;
pub use progress::{SpeedCalculator, UploadProgress};
pub use uploader::{
    ChunkedUploader, MAX_RETRY_DELAY, ProgressCallback, StatusCallback, UploadOutcome,
    UploadStatus, UploaderConfig,
};
