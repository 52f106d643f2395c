//! HTTP request handlers for the `/uploads` API.

use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};

use orderdesk_protocol::Envelope;
use orderdesk_protocol::constants::{FIELD_CHUNK, FIELD_CHUNK_INDEX, USER_ID_HEADER};
use orderdesk_protocol::messages::{
    ChunkAck, CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest,
    InitUploadResponse, UploadStatusResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Health check endpoint.
pub async fn health_check() -> &'static str {
    "OK"
}

/// POST /uploads/init
pub async fn init_upload(
    State(state): State<AppState>,
    payload: Result<Json<InitUploadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<InitUploadResponse>>)> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let resp = state.uploads.initialize(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(resp, "Upload session initialized")),
    ))
}

/// POST /uploads/{upload_id}/chunk
///
/// Multipart body with a `chunk_index` text field and a `chunk` file field.
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<Envelope<ChunkAck>>> {
    let mut index: Option<i64> = None;
    let mut chunk: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FIELD_CHUNK_INDEX => {
                let text = field.text().await.map_err(multipart_error)?;
                let parsed = text.trim().parse::<i64>().map_err(|_| {
                    ApiError::BadRequest(format!("chunk_index must be an integer, got {text:?}"))
                })?;
                index = Some(parsed);
            }
            FIELD_CHUNK => {
                chunk = Some(field.bytes().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let index = index.ok_or_else(|| ApiError::BadRequest("chunk_index is required".into()))?;
    let chunk = chunk.ok_or_else(|| ApiError::BadRequest("chunk is required".into()))?;

    let ack = state.uploads.store_chunk(upload_id, index, chunk).await?;
    Ok(Json(Envelope::with_message(ack, "Chunk uploaded successfully")))
}

/// GET /uploads/{upload_id}/status
pub async fn upload_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<Envelope<UploadStatusResponse>>> {
    let status = state.uploads.status(upload_id).await?;
    Ok(Json(Envelope::ok(status)))
}

/// POST /uploads/{upload_id}/complete
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<CompleteUploadRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<CompleteUploadResponse>>> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let uploaded_by = uploader_id(&headers)?;
    let resp = state.uploads.complete(upload_id, req, uploaded_by).await?;
    Ok(Json(Envelope::with_message(resp, "Upload completed successfully")))
}

/// DELETE /uploads/{upload_id}
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<Envelope<()>>> {
    state.uploads.cancel(upload_id).await?;
    Ok(Json(Envelope::message_only("Upload cancelled")))
}

/// Reads the optional uploader id resolved by an upstream auth layer.
fn uploader_id(headers: &HeaderMap) -> ApiResult<Option<u64>> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {USER_ID_HEADER} header")))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
