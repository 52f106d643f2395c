//! Application state shared across handlers.

use crate::service::UploadService;

/// State handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
}

impl AppState {
    pub fn new(uploads: UploadService) -> Self {
        Self { uploads }
    }
}
