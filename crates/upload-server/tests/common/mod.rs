//! Common test utilities.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use orderdesk_blob_store::FsBlobStore;
use orderdesk_transfer::{ManualClock, SequentialIds};
use orderdesk_upload_server::{
    AppState, MemoryCatalog, ServiceConfig, UploadService, create_router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "orderdesk-test-boundary";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub service: UploadService,
    pub catalog: Arc<MemoryCatalog>,
    pub blobs: Arc<FsBlobStore>,
    pub clock: Arc<ManualClock>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Server with default limits, order 42 and product 7.
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let blobs = Arc::new(
            FsBlobStore::new(temp_dir.path().join("storage")).expect("Failed to open store"),
        );
        let catalog = Arc::new(MemoryCatalog::seeded(blobs.clone(), [42], [7]));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = UploadService::with_capabilities(
            blobs.clone(),
            catalog.clone(),
            config,
            clock.clone(),
            Arc::new(SequentialIds::new()),
        );
        let router = create_router(AppState::new(service.clone()));

        Self {
            router,
            service,
            catalog,
            blobs,
            clock,
            _temp_dir: temp_dir,
        }
    }

    pub async fn json(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        json_request(&self.router, method, uri, body, &[]).await
    }

    /// Opens a session and returns its id.
    pub async fn init(&self, filename: &str, total_chunks: i64, file_size: i64) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/uploads/init",
                Some(serde_json::json!({
                    "filename": filename,
                    "total_chunks": total_chunks,
                    "file_size": file_size,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["upload_id"].as_str().unwrap().to_string()
    }

    pub async fn chunk(&self, upload_id: &str, index: i64, data: &[u8]) -> (StatusCode, Value) {
        chunk_request(&self.router, upload_id, &index.to_string(), data).await
    }

    pub async fn status(&self, upload_id: &str) -> (StatusCode, Value) {
        self.json("GET", &format!("/uploads/{upload_id}/status"), None)
            .await
    }

    pub async fn complete(&self, upload_id: &str, target_type: &str, target_id: u64) -> (StatusCode, Value) {
        self.json(
            "POST",
            &format!("/uploads/{upload_id}/complete"),
            Some(serde_json::json!({
                "target_type": target_type,
                "target_id": target_id,
            })),
        )
        .await
    }

    /// Uploads `parts` as consecutive chunks of a new session.
    pub async fn upload(&self, filename: &str, parts: &[&[u8]]) -> String {
        let size: usize = parts.iter().map(|p| p.len()).sum();
        let id = self.init(filename, parts.len() as i64, size as i64).await;
        for (i, part) in parts.iter().enumerate() {
            let (status, body) = self.chunk(&id, i as i64, part).await;
            assert_eq!(status, StatusCode::OK, "{body}");
        }
        id
    }

    /// Sends a bare GET and returns the status, raw body and content type.
    pub async fn get_raw(&self, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec(), content_type)
    }

    /// Reads a finalized file by its public `file_path`.
    pub fn public_file(&self, file_path: &str) -> Option<Vec<u8>> {
        use orderdesk_blob_store::BlobStore;
        self.blobs
            .get(&orderdesk_upload_server::public_key(file_path))
            .unwrap()
    }
}

#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    send(router, builder.body(body).unwrap()).await
}

/// Builds a `multipart/form-data` chunk upload by hand.
#[allow(dead_code)]
pub async fn chunk_request(
    router: &axum::Router,
    upload_id: &str,
    chunk_index: &str,
    data: &[u8],
) -> (StatusCode, Value) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"chunk_index\"\r\n\r\n{chunk_index}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"chunk\"; filename=\"blob\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri(format!("/uploads/{upload_id}/chunk"))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(router, request).await
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
