use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::TransferError;
use crate::completeness::is_complete;
use crate::session::{SessionStore, chunk_key};

/// A merged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Bytes written, equal to the session's declared `file_size`.
    pub bytes: u64,
    /// Absolute path of the final file.
    pub path: PathBuf,
}

/// Concatenates a session's chunks into its final file.
#[derive(Clone)]
pub struct MergeEngine {
    sessions: SessionStore,
}

impl MergeEngine {
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    /// Merges chunks `0..total_chunks` of `upload_id` into `destination`
    /// (a store key) and verifies the byte size.
    ///
    /// The file is assembled under a hidden sibling name and only renamed
    /// into place once the size matches, so `destination` never holds a
    /// partial or wrong-sized file. Chunks and metadata are left alone.
    pub fn merge(&self, upload_id: &str, destination: &str) -> Result<MergeOutcome, TransferError> {
        let meta = self
            .sessions
            .read(upload_id)?
            .ok_or_else(|| TransferError::SessionNotFound(upload_id.to_string()))?;
        if !is_complete(&self.sessions, upload_id, meta.total_chunks)? {
            return Err(TransferError::UploadIncomplete {
                received: meta.received_chunks.len(),
                total_chunks: meta.total_chunks,
            });
        }

        let blobs = self.sessions.blobs();
        if let Some((parent, _)) = destination.rsplit_once('/') {
            blobs.create_dir(parent)?;
        }
        let final_path = blobs.path(destination)?;

        let part = PartialFile::new(&final_path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(part.path())?;
        let mut writer = BufWriter::new(file);
        for index in 0..meta.total_chunks {
            let chunk_path = blobs.path(&chunk_key(upload_id, index))?;
            let mut chunk = match File::open(&chunk_path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(TransferError::MissingChunk(index));
                }
                Err(e) => return Err(e.into()),
            };
            io::copy(&mut chunk, &mut writer)?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        let actual = std::fs::metadata(part.path())?.len();
        if actual != meta.file_size {
            warn!(
                upload_id,
                expected = meta.file_size,
                actual,
                "merged size does not match declared size"
            );
            return Err(TransferError::SizeMismatch {
                expected: meta.file_size,
                actual,
            });
        }

        part.persist(&final_path)?;
        info!(
            upload_id,
            destination,
            bytes = actual,
            chunks = meta.total_chunks,
            "chunks merged"
        );
        Ok(MergeOutcome {
            bytes: actual,
            path: final_path,
        })
    }
}

/// A `.<name>.part` file next to the destination, removed on drop unless
/// persisted.
struct PartialFile {
    path: PathBuf,
    persisted: bool,
}

impl PartialFile {
    fn new(destination: &Path) -> Self {
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: destination.with_file_name(format!(".{name}.part")),
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self, destination: &Path) -> io::Result<()> {
        std::fs::rename(&self.path, destination)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use orderdesk_blob_store::{BlobStore, FsBlobStore};
    use tempfile::TempDir;

    use super::*;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::limits::UploadLimits;
    use crate::receiver::ChunkReceiver;

    struct Fixture {
        _dir: TempDir,
        sessions: SessionStore,
        receiver: ChunkReceiver,
        engine: MergeEngine,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsBlobStore::new(dir.path()).unwrap());
        let sessions = SessionStore::new(
            blobs,
            Arc::new(ManualClock::new(Utc::now())),
            Arc::new(SequentialIds::new()),
        );
        Fixture {
            _dir: dir,
            receiver: ChunkReceiver::new(sessions.clone(), UploadLimits::default()),
            engine: MergeEngine::new(sessions.clone()),
            sessions,
        }
    }

    fn dir_names(path: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(path)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn merges_in_index_order() {
        let f = fixture();
        f.sessions.create("report.pdf", 3, 9).unwrap();
        f.receiver.store_chunk("upload-1", 2, b"CCC").unwrap();
        f.receiver.store_chunk("upload-1", 0, b"AAA").unwrap();
        f.receiver.store_chunk("upload-1", 1, b"BBB").unwrap();

        let out = f
            .engine
            .merge("upload-1", "public/orders/documents/abc.pdf")
            .unwrap();
        assert_eq!(out.bytes, 9);
        assert_eq!(std::fs::read(&out.path).unwrap(), b"AAABBBCCC");
        assert_eq!(dir_names(out.path.parent().unwrap()), vec!["abc.pdf"]);

        // Session state is untouched by the merge itself.
        assert!(f.sessions.read("upload-1").unwrap().is_some());
    }

    #[test]
    fn incomplete_session_is_rejected() {
        let f = fixture();
        f.sessions.create("a.bin", 3, 9).unwrap();
        f.receiver.store_chunk("upload-1", 0, b"AAA").unwrap();

        assert!(matches!(
            f.engine.merge("upload-1", "public/x/a.bin"),
            Err(TransferError::UploadIncomplete {
                received: 1,
                total_chunks: 3
            })
        ));
        assert!(!f.sessions.blobs().exists("public/x/a.bin").unwrap());
    }

    #[test]
    fn size_mismatch_leaves_no_file() {
        let f = fixture();
        f.sessions.create("a.bin", 2, 10).unwrap();
        f.receiver.store_chunk("upload-1", 0, b"AAA").unwrap();
        f.receiver.store_chunk("upload-1", 1, b"BBB").unwrap();

        let err = f.engine.merge("upload-1", "public/x/a.bin").unwrap_err();
        assert!(matches!(
            err,
            TransferError::SizeMismatch {
                expected: 10,
                actual: 6
            }
        ));
        let dir = f.sessions.blobs().path("public/x").unwrap();
        assert!(dir_names(&dir).is_empty());
    }

    #[test]
    fn missing_chunk_file_is_reported() {
        let f = fixture();
        f.sessions.create("a.bin", 2, 6).unwrap();
        f.receiver.store_chunk("upload-1", 0, b"AAA").unwrap();
        f.receiver.store_chunk("upload-1", 1, b"BBB").unwrap();
        f.sessions
            .blobs()
            .delete(&chunk_key("upload-1", 1))
            .unwrap();

        assert!(matches!(
            f.engine.merge("upload-1", "public/x/a.bin"),
            Err(TransferError::MissingChunk(1))
        ));
        let dir = f.sessions.blobs().path("public/x").unwrap();
        assert!(dir_names(&dir).is_empty());
    }

    #[test]
    fn unknown_session() {
        let f = fixture();
        assert!(matches!(
            f.engine.merge("upload-5", "public/x/a.bin"),
            Err(TransferError::SessionNotFound(_))
        ));
    }
}
