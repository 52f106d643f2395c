//! HTTP upload service.
//!
//! Wraps the [`orderdesk_transfer`] pipeline in an [`UploadService`] that
//! drives the session state machine (init, chunks, status, complete,
//! cancel) and exposes it over axum under `/uploads`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod state;
pub mod sweeper;
pub mod targets;

pub use config::{PUBLIC_ROUTE, ServiceConfig, SweepConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use service::UploadService;
pub use state::AppState;
pub use sweeper::spawn_sweeper;
pub use targets::{
    DocumentRecord, DocumentTargets, MemoryCatalog, NewOrderDocument, TargetError, TargetFuture,
};

/// Store directory holding publicly served files.
pub const PUBLIC_DIR: &str = "public";

/// Store key of a file addressed relative to the public root.
pub fn public_key(file_path: &str) -> String {
    format!("{PUBLIC_DIR}/{file_path}")
}
