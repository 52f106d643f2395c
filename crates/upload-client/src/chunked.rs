use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use orderdesk_protocol::constants::RECOMMENDED_CHUNK_SIZE;

use crate::ClientError;

/// Number of `chunk_size` chunks needed for `file_size` bytes.
///
/// A `chunk_size` of 0 falls back to [`RECOMMENDED_CHUNK_SIZE`].
pub fn calculate_total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    let chunk_size = if chunk_size == 0 {
        RECOMMENDED_CHUNK_SIZE
    } else {
        chunk_size
    };
    file_size.div_ceil(chunk_size)
}

/// Formats a byte count for humans (`0 Bytes`, `1.5 KB`, `3 MB`).
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads fixed-size chunks of a file by index.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: u64,
    file_size: u64,
    file_name: String,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`RECOMMENDED_CHUNK_SIZE`] (1 MiB) is used.
    pub fn open(path: &Path, chunk_size: u64) -> Result<Self, ClientError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            RECOMMENDED_CHUNK_SIZE
        } else {
            chunk_size
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            file,
            chunk_size,
            file_size,
            file_name,
        })
    }

    /// Reads chunk `index`. The last chunk may be shorter than the chunk size.
    pub fn read_chunk(&mut self, index: u32) -> Result<Vec<u8>, ClientError> {
        let total_chunks = self.total_chunks();
        if index >= total_chunks {
            return Err(ClientError::ChunkOutOfRange {
                index,
                total_chunks,
            });
        }

        let offset = u64::from(index) * self.chunk_size;
        let len = self.chunk_size.min(self.file_size - offset) as usize;
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Number of chunks in the file.
    pub fn total_chunks(&self) -> u32 {
        u32::try_from(calculate_total_chunks(self.file_size, self.chunk_size)).unwrap_or(u32::MAX)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Base name of the file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}
