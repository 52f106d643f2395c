//! Upload API client.
//!
//! Thin async wrapper over the `/uploads` endpoints using `reqwest`.

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use orderdesk_protocol::constants::{FIELD_CHUNK, FIELD_CHUNK_INDEX, USER_ID_HEADER};
use orderdesk_protocol::messages::{
    ChunkAck, CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest,
    InitUploadResponse, UploadStatusResponse,
};
use orderdesk_protocol::{Envelope, TargetType};

use crate::error::ClientError;

/// Client for one upload server.
#[derive(Clone)]
pub struct UploadApi {
    http: reqwest::Client,
    base_url: String,
    user_id: Option<u64>,
}

impl UploadApi {
    /// Creates a client for the server at `base_url` (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Creates a client reusing an existing `reqwest` client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: None,
        }
    }

    /// Sends `X-User-Id` on completion requests.
    pub fn with_user_id(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Opens a session.
    pub async fn initialize(
        &self,
        filename: &str,
        total_chunks: u32,
        file_size: u64,
    ) -> Result<InitUploadResponse, ClientError> {
        let body = InitUploadRequest {
            filename: filename.to_string(),
            total_chunks: i64::from(total_chunks),
            file_size: i64::try_from(file_size).unwrap_or(i64::MAX),
        };
        let req = self.http.post(self.url("/uploads/init")).json(&body);
        data(req.send().await?).await
    }

    /// Uploads chunk `index` of session `upload_id`.
    pub async fn upload_chunk(
        &self,
        upload_id: &str,
        index: u32,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck, ClientError> {
        let part = Part::bytes(bytes)
            .file_name("blob")
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text(FIELD_CHUNK_INDEX, index.to_string())
            .part(FIELD_CHUNK, part);
        let req = self
            .http
            .post(self.url(&format!("/uploads/{upload_id}/chunk")))
            .multipart(form);
        data(req.send().await?).await
    }

    /// Reads session state.
    pub async fn status(&self, upload_id: &str) -> Result<UploadStatusResponse, ClientError> {
        let req = self
            .http
            .get(self.url(&format!("/uploads/{upload_id}/status")));
        data(req.send().await?).await
    }

    /// Finalizes a fully uploaded session.
    pub async fn complete(
        &self,
        upload_id: &str,
        target_type: TargetType,
        target_id: u64,
    ) -> Result<CompleteUploadResponse, ClientError> {
        let body = CompleteUploadRequest {
            target_type,
            target_id,
        };
        let mut req = self
            .http
            .post(self.url(&format!("/uploads/{upload_id}/complete")))
            .json(&body);
        if let Some(user_id) = self.user_id {
            req = req.header(USER_ID_HEADER, user_id.to_string());
        }
        data(req.send().await?).await
    }

    /// Deletes a session. Succeeds for unknown sessions.
    pub async fn cancel(&self, upload_id: &str) -> Result<(), ClientError> {
        let req = self.http.delete(self.url(&format!("/uploads/{upload_id}")));
        let resp = req.send().await?;
        check(resp).await.map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Returns the body of a 2xx response, or the parsed error.
async fn check(resp: reqwest::Response) -> Result<Vec<u8>, ClientError> {
    let status = resp.status();
    let body = resp.bytes().await?;
    if !status.is_success() {
        return Err(ClientError::from_body(status.as_u16(), &body));
    }
    Ok(body.to_vec())
}

/// Unwraps the `data` member of a success envelope.
async fn data<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let body = check(resp).await?;
    let envelope: Envelope<T> = serde_json::from_slice(&body)?;
    envelope.data.ok_or(ClientError::EmptyResponse)
}
