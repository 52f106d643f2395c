//! Key-addressed blob storage with directory semantics.
//!
//! Keys are `/`-separated relative paths (`chunks/<id>/metadata.json`).
//! A directory is the unit of bulk deletion: [`BlobStore::delete_dir`]
//! hides the whole subtree in one step, so readers never observe a
//! half-removed directory through its key.

mod error;
mod fs;
mod key;

use std::path::PathBuf;

pub use error::StoreError;
pub use fs::FsBlobStore;
pub use key::validate_key;

/// Directory under the store root where deleted subtrees are parked
/// until they are physically removed.
pub const TRASH_DIR: &str = ".trash";

/// Durable byte storage used by the upload pipeline.
///
/// All operations are blocking; async callers run them on
/// `tokio::task::spawn_blocking`.
pub trait BlobStore: Send + Sync + 'static {
    /// Creates a directory and any missing parents.
    fn create_dir(&self, key: &str) -> Result<(), StoreError>;

    /// Lists the names of immediate subdirectories of `key`, sorted.
    ///
    /// A missing directory lists as empty.
    fn list_dirs(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Removes a directory and everything under it.
    ///
    /// Returns `false` if the directory did not exist.
    fn delete_dir(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically writes `data` at `key`, replacing any previous object.
    ///
    /// The parent directory must already exist; it is never created
    /// implicitly, so writes into a deleted directory fail with
    /// [`StoreError::MissingParent`].
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Reads an object, `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns `true` if an object exists at `key`.
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Deletes an object. Returns `false` if it did not exist.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Resolves `key` to an absolute filesystem path for direct I/O.
    fn path(&self, key: &str) -> Result<PathBuf, StoreError>;

    /// Physically removes subtrees parked by earlier [`delete_dir`](Self::delete_dir)
    /// calls whose removal failed. Returns the number purged.
    fn purge_trash(&self) -> Result<usize, StoreError>;
}
