use orderdesk_protocol::constants::{
    MAX_CHUNK_BYTES, MAX_FILE_SIZE, MAX_FILENAME_LEN, MAX_TOTAL_CHUNKS, RECOMMENDED_CHUNK_SIZE,
};

use crate::TransferError;

/// Longest extension carried over from a client filename.
const MAX_EXTENSION_LEN: usize = 16;

/// Hard limits checked at the API boundary before the core runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    /// Chunk size recommended to clients (not enforced).
    pub chunk_size: u64,
    /// Largest accepted chunk payload.
    pub max_chunk_bytes: u64,
    pub max_total_chunks: u32,
    pub max_file_size: u64,
    pub max_filename_len: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            max_chunk_bytes: MAX_CHUNK_BYTES,
            max_total_chunks: MAX_TOTAL_CHUNKS,
            max_file_size: MAX_FILE_SIZE,
            max_filename_len: MAX_FILENAME_LEN,
        }
    }
}

impl UploadLimits {
    /// Validates initialization input and narrows the counts.
    ///
    /// Rejects:
    /// - Empty or over-long filenames
    /// - `total_chunks` outside `1..=max_total_chunks`
    /// - `file_size` outside `1..=max_file_size`
    pub fn validate_init(
        &self,
        filename: &str,
        total_chunks: i64,
        file_size: i64,
    ) -> Result<(u32, u64), TransferError> {
        if filename.trim().is_empty() {
            return Err(TransferError::Validation("filename is required".into()));
        }
        let len = filename.chars().count();
        if len > self.max_filename_len {
            return Err(TransferError::Validation(format!(
                "filename is {len} characters, maximum is {}",
                self.max_filename_len
            )));
        }

        let total_chunks = u32::try_from(total_chunks)
            .ok()
            .filter(|n| (1..=self.max_total_chunks).contains(n))
            .ok_or_else(|| {
                TransferError::Validation(format!(
                    "total_chunks must be between 1 and {}, got {total_chunks}",
                    self.max_total_chunks
                ))
            })?;

        let file_size = u64::try_from(file_size)
            .ok()
            .filter(|n| (1..=self.max_file_size).contains(n))
            .ok_or_else(|| {
                TransferError::Validation(format!(
                    "file_size must be between 1 and {} bytes, got {file_size}",
                    self.max_file_size
                ))
            })?;

        Ok((total_chunks, file_size))
    }

    /// Rejects chunk payloads above [`max_chunk_bytes`](Self::max_chunk_bytes).
    pub fn validate_chunk_len(&self, len: usize) -> Result<(), TransferError> {
        let size = len as u64;
        if size > self.max_chunk_bytes {
            return Err(TransferError::ChunkTooLarge {
                size,
                max: self.max_chunk_bytes,
            });
        }
        Ok(())
    }
}

/// Extracts a safe, lowercase extension from an untrusted client filename.
///
/// Returns `None` when the name has no extension or the extension contains
/// anything but ASCII alphanumerics.
pub fn file_extension(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundary_values() {
        let limits = UploadLimits::default();
        assert_eq!(
            limits.validate_init("a.bin", 1, 1).unwrap(),
            (1, 1)
        );
        assert_eq!(
            limits
                .validate_init("a.bin", 10_000, 5 * 1024 * 1024 * 1024)
                .unwrap(),
            (10_000, 5 * 1024 * 1024 * 1024)
        );
    }

    #[test]
    fn rejects_zero_and_excess_chunks() {
        let limits = UploadLimits::default();
        assert!(limits.validate_init("a", 0, 10).is_err());
        assert!(limits.validate_init("a", -3, 10).is_err());
        assert!(limits.validate_init("a", 10_001, 10).is_err());
    }

    #[test]
    fn rejects_bad_file_size() {
        let limits = UploadLimits::default();
        assert!(limits.validate_init("a", 1, 0).is_err());
        assert!(limits.validate_init("a", 1, 5 * 1024 * 1024 * 1024 + 1).is_err());
    }

    #[test]
    fn rejects_missing_or_long_filename() {
        let limits = UploadLimits::default();
        assert!(limits.validate_init("   ", 1, 1).is_err());
        let long = "x".repeat(256);
        let err = limits.validate_init(&long, 1, 1).unwrap_err();
        assert!(err.to_string().contains("256"));
    }

    #[test]
    fn chunk_len_limit() {
        let limits = UploadLimits::default();
        assert!(limits.validate_chunk_len(2 * 1024 * 1024).is_ok());
        assert!(matches!(
            limits.validate_chunk_len(2 * 1024 * 1024 + 1),
            Err(TransferError::ChunkTooLarge { .. })
        ));
    }

    #[test]
    fn extension_simple() {
        assert_eq!(file_extension("report.pdf").as_deref(), Some("pdf"));
        assert_eq!(file_extension("Scan.JPEG").as_deref(), Some("jpeg"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
    }

    #[test]
    fn extension_absent_or_unsafe() {
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension(".bashrc"), None);
        assert_eq!(file_extension("trailing."), None);
        assert_eq!(file_extension("evil.p/hp"), None);
        assert_eq!(file_extension("x.ph p"), None);
    }

    #[test]
    fn extension_ignores_directories() {
        assert_eq!(file_extension("C:\\docs\\invoice.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("dir.v2/notes"), None);
    }
}
