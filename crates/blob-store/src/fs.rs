//! Local filesystem backend.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::key::validate_key;
use crate::{BlobStore, StoreError, TRASH_DIR};

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = std::fs::canonicalize(&root)?;
        Ok(Self { root })
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }
}

impl BlobStore for FsBlobStore {
    fn create_dir(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        std::fs::create_dir_all(&path)?;
        Ok(())
    }

    fn list_dirs(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let path = self.resolve(key)?;
        let entries = match std::fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_dir(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve(key)?;

        // Park the subtree under the trash directory first. The rename is
        // atomic, so the key stops resolving before any file is removed.
        let trash = self.trash_dir();
        std::fs::create_dir_all(&trash)?;
        let parked = trash.join(uuid::Uuid::new_v4().to_string());
        match std::fs::rename(&path, &parked) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = std::fs::remove_dir_all(&parked) {
            warn!(
                key,
                parked = %parked.display(),
                "deferred removal of deleted directory: {e}"
            );
        }
        debug!(key, "directory deleted");
        Ok(true)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;

        // Write to a sibling temp file, then rename over the target.
        let mut tmp = match tempfile::NamedTempFile::new_in(parent) {
            Ok(tmp) => tmp,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingParent(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        tmp.write_all(data)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::NotFound {
                StoreError::MissingParent(key.to_string())
            } else {
                StoreError::Io(e.error)
            }
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.resolve(key)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve(key)?;
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn path(&self, key: &str) -> Result<PathBuf, StoreError> {
        self.resolve(key)
    }

    fn purge_trash(&self) -> Result<usize, StoreError> {
        let trash = self.trash_dir();
        let entries = match std::fs::read_dir(&trash) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut purged = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => purged += 1,
                Err(e) => warn!(path = %path.display(), "failed to purge trash entry: {e}"),
            }
        }
        Ok(purged)
    }
}
