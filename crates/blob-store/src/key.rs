use std::path::{Component, Path};

use crate::{StoreError, TRASH_DIR};

/// Validates that a storage key cannot escape the store root.
///
/// Rejects:
/// - Empty keys
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
/// - Keys inside the reserved trash directory
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("empty key".into()));
    }

    let path = Path::new(key);

    if path.is_absolute() {
        return Err(StoreError::InvalidKey(format!(
            "absolute path not allowed: {key}"
        )));
    }

    for (i, component) in path.components().enumerate() {
        match component {
            Component::ParentDir => {
                return Err(StoreError::InvalidKey(format!(
                    "parent directory traversal not allowed: {key}"
                )));
            }
            Component::Prefix(_) => {
                return Err(StoreError::InvalidKey(format!(
                    "path prefix not allowed: {key}"
                )));
            }
            Component::RootDir => {
                return Err(StoreError::InvalidKey(format!(
                    "absolute path not allowed: {key}"
                )));
            }
            Component::Normal(name) if i == 0 && name == TRASH_DIR => {
                return Err(StoreError::InvalidKey(format!("reserved key: {key}")));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
