//! Entities a finished upload is attached to.
//!
//! [`DocumentTargets`] is the seam between the upload pipeline and the rest
//! of the application (orders and products). [`MemoryCatalog`] is an
//! in-process implementation used by the standalone server and tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use orderdesk_blob_store::{BlobStore, StoreError};
use orderdesk_protocol::TargetType;

use crate::public_key;

/// A boxed future returned by [`DocumentTargets`] methods.
pub type TargetFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TargetError>> + Send + 'a>>;

/// Errors from the attach collaborator.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// A document about to be attached to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderDocument {
    pub order_id: u64,
    /// Stored (randomized) file name.
    pub filename: String,
    /// Name the client uploaded the file under.
    pub original_name: String,
    /// Path relative to the public storage root.
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub uploaded_by: Option<u64>,
    pub url: String,
}

/// An order document as recorded by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub id: u64,
    pub order_id: u64,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub uploaded_by: Option<u64>,
    pub url: String,
}

/// Attach collaborator consumed by upload completion.
pub trait DocumentTargets: Send + Sync + 'static {
    /// Returns `true` if the entity behind `(target, id)` exists.
    fn exists(&self, target: TargetType, id: u64) -> TargetFuture<'_, bool>;

    /// Appends a document to an order's collection.
    ///
    /// Fails with [`TargetError::NotFound`] if the order does not exist.
    fn attach_order_document(&self, doc: NewOrderDocument) -> TargetFuture<'_, DocumentRecord>;

    /// Points a product's single document slot at `file_path`, deleting the
    /// file previously stored there.
    ///
    /// Fails with [`TargetError::NotFound`] if the product does not exist.
    fn replace_product_document(&self, product_id: u64, file_path: String)
    -> TargetFuture<'_, ()>;
}

#[derive(Debug, Default)]
struct CatalogState {
    orders: BTreeMap<u64, Vec<DocumentRecord>>,
    products: BTreeMap<u64, Option<String>>,
    next_document_id: u64,
}

/// In-memory orders and products.
pub struct MemoryCatalog {
    blobs: Arc<dyn BlobStore>,
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    /// Creates an empty catalog. `blobs` is used to delete replaced product
    /// documents.
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Creates a catalog holding the given order and product ids.
    pub fn seeded(
        blobs: Arc<dyn BlobStore>,
        orders: impl IntoIterator<Item = u64>,
        products: impl IntoIterator<Item = u64>,
    ) -> Self {
        let state = CatalogState {
            orders: orders.into_iter().map(|id| (id, Vec::new())).collect(),
            products: products.into_iter().map(|id| (id, None)).collect(),
            next_document_id: 0,
        };
        Self {
            blobs,
            state: RwLock::new(state),
        }
    }

    pub async fn add_order(&self, id: u64) {
        self.state.write().await.orders.entry(id).or_default();
    }

    pub async fn add_product(&self, id: u64) {
        self.state.write().await.products.entry(id).or_default();
    }

    /// Documents attached to `order_id`, oldest first.
    pub async fn order_documents(&self, order_id: u64) -> Vec<DocumentRecord> {
        self.state
            .read()
            .await
            .orders
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Current document path of `product_id`, if any.
    pub async fn product_document(&self, product_id: u64) -> Option<String> {
        self.state
            .read()
            .await
            .products
            .get(&product_id)
            .cloned()
            .flatten()
    }
}

impl DocumentTargets for MemoryCatalog {
    fn exists(&self, target: TargetType, id: u64) -> TargetFuture<'_, bool> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(match target {
                TargetType::OrderDocument => state.orders.contains_key(&id),
                TargetType::ProductDocument => state.products.contains_key(&id),
            })
        })
    }

    fn attach_order_document(&self, doc: NewOrderDocument) -> TargetFuture<'_, DocumentRecord> {
        Box::pin(async move {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let documents = state.orders.get_mut(&doc.order_id).ok_or(TargetError::NotFound {
                entity: "order",
                id: doc.order_id,
            })?;
            state.next_document_id += 1;
            let id = state.next_document_id;
            let record = DocumentRecord {
                id,
                order_id: doc.order_id,
                filename: doc.filename,
                original_name: doc.original_name,
                file_path: doc.file_path,
                file_size: doc.file_size,
                mime_type: doc.mime_type,
                uploaded_by: doc.uploaded_by,
                url: doc.url,
            };
            documents.push(record.clone());

            info!(
                order_id = record.order_id,
                document_id = id,
                file_path = %record.file_path,
                "order document attached"
            );
            Ok(record)
        })
    }

    fn replace_product_document(
        &self,
        product_id: u64,
        file_path: String,
    ) -> TargetFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let slot = state
                .products
                .get_mut(&product_id)
                .ok_or(TargetError::NotFound {
                    entity: "product",
                    id: product_id,
                })?;

            if let Some(previous) = slot.take() {
                let key = public_key(&previous);
                let blobs = Arc::clone(&self.blobs);
                let deleted = tokio::task::spawn_blocking(move || blobs.delete(&key))
                    .await
                    .map_err(|e| StoreError::Io(std::io::Error::other(e)));
                match deleted {
                    Ok(Ok(_)) => {
                        debug!(product_id, previous = %previous, "previous product document deleted");
                    }
                    Ok(Err(e)) | Err(e) => {
                        *slot = Some(previous);
                        return Err(e.into());
                    }
                }
            }

            *slot = Some(file_path.clone());
            info!(product_id, file_path = %file_path, "product document replaced");
            Ok(())
        })
    }
}
