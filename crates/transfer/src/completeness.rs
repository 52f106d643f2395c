use crate::TransferError;
use crate::session::SessionStore;

/// Returns `true` if session `upload_id` has received all `total_chunks`.
///
/// Re-reads persisted metadata so the answer reflects other writers. An
/// unknown session is reported as incomplete, not as an error.
pub fn is_complete(
    sessions: &SessionStore,
    upload_id: &str,
    total_chunks: u32,
) -> Result<bool, TransferError> {
    let Some(meta) = sessions.read(upload_id)? else {
        return Ok(false);
    };
    Ok(meta.total_chunks == total_chunks && meta.is_complete())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use orderdesk_blob_store::FsBlobStore;
    use tempfile::TempDir;

    use super::*;
    use crate::clock::{ManualClock, SequentialIds};

    fn sessions() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsBlobStore::new(dir.path()).unwrap());
        let store = SessionStore::new(
            blobs,
            Arc::new(ManualClock::new(Utc::now())),
            Arc::new(SequentialIds::new()),
        );
        (dir, store)
    }

    #[test]
    fn unknown_session_is_incomplete() {
        let (_dir, store) = sessions();
        assert!(!is_complete(&store, "upload-1", 3).unwrap());
    }

    #[test]
    fn complete_after_all_indices() {
        let (_dir, store) = sessions();
        store.create("report.pdf", 3, 30).unwrap();
        for i in [2, 0] {
            store
                .update("upload-1", |m| {
                    m.received_chunks.insert(i);
                    Ok(())
                })
                .unwrap();
        }
        assert!(!is_complete(&store, "upload-1", 3).unwrap());

        store
            .update("upload-1", |m| {
                m.received_chunks.insert(1);
                Ok(())
            })
            .unwrap();
        assert!(is_complete(&store, "upload-1", 3).unwrap());
    }

    #[test]
    fn different_expected_total_is_incomplete() {
        let (_dir, store) = sessions();
        store.create("report.pdf", 1, 10).unwrap();
        store
            .update("upload-1", |m| {
                m.received_chunks.insert(0);
                Ok(())
            })
            .unwrap();
        assert!(is_complete(&store, "upload-1", 1).unwrap());
        assert!(!is_complete(&store, "upload-1", 2).unwrap());
    }
}
