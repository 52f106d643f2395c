//! Resumable chunked upload of one file.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use orderdesk_protocol::TargetType;
use orderdesk_protocol::constants::RECOMMENDED_CHUNK_SIZE;
use orderdesk_protocol::messages::CompleteUploadResponse;

use crate::api::UploadApi;
use crate::chunked::{ChunkReader, calculate_total_chunks, format_file_size};
use crate::error::ClientError;
use crate::progress::{SpeedCalculator, UploadProgress};

/// Upper bound on the delay between two attempts at the same chunk.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Callback invoked with upload progress.
pub type ProgressCallback = Box<dyn Fn(UploadProgress) + Send + Sync>;

/// Callback invoked on every status change.
pub type StatusCallback = Box<dyn Fn(UploadStatus) + Send + Sync>;

/// Lifecycle of a [`ChunkedUploader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    Initializing,
    Uploading,
    Paused,
    Completing,
    Completed,
    Error,
    Cancelled,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Uploading => "uploading",
            Self::Paused => "paused",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a `start` or `resume` call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Completed(CompleteUploadResponse),
    Paused,
    Cancelled,
}

/// Uploader tuning.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Bytes per chunk; the server's recommendation is 1 MiB.
    pub chunk_size: u64,
    /// Attempts per chunk before giving up.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt,
    /// up to [`MAX_RETRY_DELAY`].
    pub retry_base_delay: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

struct State {
    status: UploadStatus,
    upload_id: Option<String>,
    uploaded: BTreeSet<u32>,
}

struct Inner {
    api: UploadApi,
    reader: Arc<Mutex<ChunkReader>>,
    target_type: TargetType,
    target_id: u64,
    config: UploaderConfig,
    file_name: String,
    file_size: u64,
    total_chunks: u32,
    state: Mutex<State>,
    cancel: CancellationToken,
    speed: SpeedCalculator,
    progress_callbacks: RwLock<Vec<ProgressCallback>>,
    status_callbacks: RwLock<Vec<StatusCallback>>,
}

/// Uploads one file in chunks and attaches it to a target.
///
/// Clones share state, so a clone can pause or cancel an upload that is
/// running in another task.
#[derive(Clone)]
pub struct ChunkedUploader {
    inner: Arc<Inner>,
}

impl ChunkedUploader {
    /// Prepares an upload of `path`, to be attached to `(target_type, target_id)`.
    pub fn new(
        api: UploadApi,
        path: &Path,
        target_type: TargetType,
        target_id: u64,
        config: UploaderConfig,
    ) -> Result<Self, ClientError> {
        let reader = ChunkReader::open(path, config.chunk_size)?;
        let chunks = calculate_total_chunks(reader.file_size(), reader.chunk_size());
        let total_chunks = u32::try_from(chunks).map_err(|_| ClientError::TooManyChunks {
            chunks,
            chunk_size: reader.chunk_size(),
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                api,
                file_name: reader.file_name().to_string(),
                file_size: reader.file_size(),
                reader: Arc::new(Mutex::new(reader)),
                target_type,
                target_id,
                config,
                total_chunks,
                state: Mutex::new(State {
                    status: UploadStatus::Idle,
                    upload_id: None,
                    uploaded: BTreeSet::new(),
                }),
                cancel: CancellationToken::new(),
                speed: SpeedCalculator::default(),
                progress_callbacks: RwLock::new(Vec::new()),
                status_callbacks: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Registers a progress callback.
    pub fn on_progress(&self, cb: ProgressCallback) {
        self.inner
            .progress_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cb);
    }

    /// Registers a status-change callback.
    pub fn on_status_change(&self, cb: StatusCallback) {
        self.inner
            .status_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cb);
    }

    pub fn status(&self) -> UploadStatus {
        self.lock().status
    }

    /// Server session id once initialized.
    pub fn upload_id(&self) -> Option<String> {
        self.lock().upload_id.clone()
    }

    pub fn total_chunks(&self) -> u32 {
        self.inner.total_chunks
    }

    /// Current progress, including speed and ETA.
    pub fn progress(&self) -> UploadProgress {
        let uploaded = self.lock().uploaded.len() as u32;
        UploadProgress::new(
            uploaded,
            self.inner.total_chunks,
            self.inner.config.chunk_size,
            self.inner.file_size,
        )
        .with_speed(&self.inner.speed)
    }

    /// Opens a session, uploads every chunk and completes the upload.
    ///
    /// Returns early with [`UploadOutcome::Paused`] or
    /// [`UploadOutcome::Cancelled`] if [`pause`](Self::pause) or
    /// [`cancel`](Self::cancel) is called meanwhile.
    pub async fn start(&self) -> Result<UploadOutcome, ClientError> {
        self.transition(&[UploadStatus::Idle], UploadStatus::Initializing, "idle")?;
        info!(
            file = %self.inner.file_name,
            size = %format_file_size(self.inner.file_size),
            chunks = self.inner.total_chunks,
            "starting upload"
        );

        let result = async {
            self.open_session().await?;
            self.run().await
        }
        .await;
        self.settle(result)
    }

    /// Continues a paused or failed upload.
    ///
    /// The server's received set is fetched again, so only missing chunks
    /// are sent before completing. An upload that failed before its session
    /// was opened starts a new session.
    pub async fn resume(&self) -> Result<UploadOutcome, ClientError> {
        self.transition(
            &[UploadStatus::Paused, UploadStatus::Error],
            UploadStatus::Uploading,
            "paused or error",
        )?;
        let result = async {
            if self.upload_id().is_none() {
                self.open_session().await?;
            }
            self.run().await
        }
        .await;
        self.settle(result)
    }

    /// Stops after the chunk in flight. Returns `false` if not uploading.
    pub fn pause(&self) -> bool {
        let paused = {
            let mut state = self.lock();
            if state.status == UploadStatus::Uploading {
                state.status = UploadStatus::Paused;
                true
            } else {
                false
            }
        };
        if paused {
            self.notify_status(UploadStatus::Paused);
        }
        paused
    }

    /// Abandons the upload and deletes the server session.
    ///
    /// Failure to reach the server is logged, not returned; the session is
    /// then reclaimed by the server's sweeper.
    pub async fn cancel(&self) {
        let upload_id = {
            let mut state = self.lock();
            if matches!(state.status, UploadStatus::Completed | UploadStatus::Cancelled) {
                return;
            }
            state.status = UploadStatus::Cancelled;
            state.upload_id.clone()
        };
        self.inner.cancel.cancel();
        self.notify_status(UploadStatus::Cancelled);

        if let Some(id) = upload_id {
            match self.inner.api.cancel(&id).await {
                Ok(()) => info!(upload_id = %id, "upload cancelled"),
                Err(e) => warn!(upload_id = %id, "failed to cancel upload session: {e}"),
            }
        }
    }

    async fn open_session(&self) -> Result<(), ClientError> {
        let init = self
            .inner
            .api
            .initialize(
                &self.inner.file_name,
                self.inner.total_chunks,
                self.inner.file_size,
            )
            .await?;
        if init.chunk_size != self.inner.config.chunk_size {
            debug!(
                recommended = init.chunk_size,
                used = self.inner.config.chunk_size,
                "server recommends a different chunk size"
            );
        }
        self.lock().upload_id = Some(init.upload_id);
        Ok(())
    }

    async fn run(&self) -> Result<UploadOutcome, ClientError> {
        self.sync_received().await?;
        self.set_status(UploadStatus::Uploading);

        if let Some(outcome) = self.upload_remaining().await? {
            return Ok(outcome);
        }

        let upload_id = self.current_upload_id()?;
        self.set_status(UploadStatus::Completing);
        let resp = self
            .inner
            .api
            .complete(&upload_id, self.inner.target_type, self.inner.target_id)
            .await?;
        self.set_status(UploadStatus::Completed);
        info!(upload_id = %upload_id, url = %resp.url, "upload completed");
        Ok(UploadOutcome::Completed(resp))
    }

    /// Loads the server's received set so already stored chunks are skipped.
    async fn sync_received(&self) -> Result<(), ClientError> {
        let upload_id = self.current_upload_id()?;
        let status = self.inner.api.status(&upload_id).await?;
        self.lock().uploaded = status.received_chunks.into_iter().collect();
        self.notify_progress();
        Ok(())
    }

    async fn upload_remaining(&self) -> Result<Option<UploadOutcome>, ClientError> {
        let upload_id = self.current_upload_id()?;
        for index in 0..self.inner.total_chunks {
            {
                let state = self.lock();
                match state.status {
                    UploadStatus::Paused => return Ok(Some(UploadOutcome::Paused)),
                    UploadStatus::Cancelled => return Ok(Some(UploadOutcome::Cancelled)),
                    _ => {}
                }
                if state.uploaded.contains(&index) {
                    continue;
                }
            }
            self.upload_with_retry(&upload_id, index).await?;
        }
        Ok(None)
    }

    async fn upload_with_retry(&self, upload_id: &str, index: u32) -> Result<(), ClientError> {
        let bytes = self.read_chunk(index).await?;
        let size = bytes.len() as u64;
        let attempts = self.inner.config.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            match self
                .inner
                .api
                .upload_chunk(upload_id, index, bytes.clone())
                .await
            {
                Ok(ack) => {
                    self.lock().uploaded = ack.received_chunks.into_iter().collect();
                    self.inner.speed.add_sample(size);
                    debug!(upload_id, chunk_index = index, size, "chunk uploaded");
                    self.notify_progress();
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt + 1 >= attempts => {
                    return Err(ClientError::ChunkFailed {
                        index,
                        attempts,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = backoff_delay(self.inner.config.retry_base_delay, attempt);
                    warn!(
                        upload_id,
                        chunk_index = index,
                        attempt = attempt + 1,
                        retry_in_ms = delay.as_millis() as u64,
                        "chunk upload failed: {e}"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.inner.cancel.cancelled() => return Err(ClientError::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn read_chunk(&self, index: u32) -> Result<Vec<u8>, ClientError> {
        let reader = Arc::clone(&self.inner.reader);
        tokio::task::spawn_blocking(move || {
            reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .read_chunk(index)
        })
        .await
        .map_err(|e| ClientError::Io(std::io::Error::other(e)))?
    }

    /// Maps the result of a run onto the final status.
    fn settle(
        &self,
        result: Result<UploadOutcome, ClientError>,
    ) -> Result<UploadOutcome, ClientError> {
        if self.status() == UploadStatus::Cancelled {
            return Ok(UploadOutcome::Cancelled);
        }
        match result {
            Err(ClientError::Cancelled) => Ok(UploadOutcome::Cancelled),
            Err(e) => {
                self.set_status(UploadStatus::Error);
                Err(e)
            }
            ok => ok,
        }
    }

    fn transition(
        &self,
        from: &[UploadStatus],
        to: UploadStatus,
        expected: &'static str,
    ) -> Result<(), ClientError> {
        {
            let mut state = self.lock();
            if !from.contains(&state.status) {
                return Err(ClientError::InvalidState(state.status.as_str(), expected));
            }
            state.status = to;
        }
        self.notify_status(to);
        Ok(())
    }

    /// Sets `status` unless the upload was paused or cancelled meanwhile.
    fn set_status(&self, status: UploadStatus) {
        {
            let mut state = self.lock();
            if matches!(state.status, UploadStatus::Paused | UploadStatus::Cancelled)
                && status != UploadStatus::Error
            {
                return;
            }
            if state.status == status {
                return;
            }
            state.status = status;
        }
        self.notify_status(status);
    }

    fn current_upload_id(&self) -> Result<String, ClientError> {
        self.lock()
            .upload_id
            .clone()
            .ok_or(ClientError::InvalidState("idle", "initialized"))
    }

    fn notify_status(&self, status: UploadStatus) {
        let callbacks = self
            .inner
            .status_callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for cb in callbacks.iter() {
            cb(status);
        }
    }

    fn notify_progress(&self) {
        let progress = self.progress();
        let callbacks = self
            .inner
            .progress_callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for cb in callbacks.iter() {
            cb(progress.clone());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Delay after the failed attempt number `attempt` (zero-based).
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY.max(base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn uploader(data: &[u8]) -> (ChunkedUploader, tempfile::NamedTempFile) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(data).unwrap();
        let api = UploadApi::new("http://127.0.0.1:9").unwrap();
        let config = UploaderConfig {
            chunk_size: 4,
            ..UploaderConfig::default()
        };
        let u = ChunkedUploader::new(api, f.path(), TargetType::OrderDocument, 1, config).unwrap();
        (u, f)
    }

    #[test]
    fn default_config() {
        let config = UploaderConfig::default();
        assert_eq!(config.chunk_size, 1_048_576);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base_delay, Duration::from_secs(1));
    }

    #[test]
    fn counts_chunks_and_starts_idle() {
        let (u, _f) = uploader(b"0123456789");
        assert_eq!(u.total_chunks(), 3);
        assert_eq!(u.status(), UploadStatus::Idle);
        assert!(u.upload_id().is_none());

        let p = u.progress();
        assert_eq!(p.uploaded_chunks, 0);
        assert_eq!(p.total_bytes, 10);
    }

    #[tokio::test]
    async fn pause_and_resume_require_matching_state() {
        let (u, _f) = uploader(b"0123456789");
        assert!(!u.pause());
        assert!(matches!(
            u.resume().await,
            Err(ClientError::InvalidState("idle", "paused or error"))
        ));
    }

    #[tokio::test]
    async fn cancel_before_start_is_local() {
        let (u, _f) = uploader(b"abc");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        u.on_status_change(Box::new(move |s| sink.lock().unwrap().push(s)));

        u.cancel().await;
        assert_eq!(u.status(), UploadStatus::Cancelled);
        assert_eq!(*seen.lock().unwrap(), vec![UploadStatus::Cancelled]);

        // Terminal: a second cancel is a no-op and start is refused.
        u.cancel().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(matches!(
            u.start().await,
            Err(ClientError::InvalidState("cancelled", "idle"))
        ));
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 40), MAX_RETRY_DELAY);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_RETRY_DELAY);

        // A base above the cap is used as is.
        let slow = Duration::from_secs(90);
        assert_eq!(backoff_delay(slow, 5), slow);
    }

    #[test]
    fn status_display() {
        assert_eq!(UploadStatus::Completing.to_string(), "completing");
        assert_eq!(UploadStatus::Error.as_str(), "error");
    }
}
