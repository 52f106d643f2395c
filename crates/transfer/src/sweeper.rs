use chrono::Duration;
use tracing::{info, warn};

use crate::TransferError;
use crate::session::SessionStore;

/// Counts from one sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired sessions deleted.
    pub removed: usize,
    /// Directories without readable metadata deleted.
    pub orphans: usize,
    /// Sessions that could not be inspected or deleted.
    pub failed: usize,
    /// Parked trash entries purged.
    pub trash_purged: usize,
}

/// Garbage-collects abandoned upload sessions.
#[derive(Clone)]
pub struct SessionSweeper {
    sessions: SessionStore,
}

impl SessionSweeper {
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    /// Deletes every session whose age (since creation) is at least
    /// `max_age`, plus session directories with missing or unreadable
    /// metadata. A failure on one session is logged and counted, never
    /// aborting the pass.
    pub fn sweep(&self, max_age: Duration) -> Result<SweepReport, TransferError> {
        let now = self.sessions.clock().now();
        let mut report = SweepReport::default();

        for name in self.sessions.list()? {
            let meta = match self.sessions.read(&name) {
                Ok(meta) => meta,
                Err(TransferError::CorruptMetadata { .. }) => None,
                Err(e) => {
                    warn!(upload_id = %name, "cannot inspect upload session: {e}");
                    report.failed += 1;
                    continue;
                }
            };

            let orphan = meta.is_none();
            let expired = meta.as_ref().is_some_and(|m| m.age(now) >= max_age);
            if !orphan && !expired {
                continue;
            }

            match self.sessions.remove_dir(&name) {
                Ok(_) if orphan => report.orphans += 1,
                Ok(_) => report.removed += 1,
                Err(e) => {
                    warn!(upload_id = %name, "failed to remove upload session: {e}");
                    report.failed += 1;
                }
            }
        }

        match self.sessions.blobs().purge_trash() {
            Ok(n) => report.trash_purged = n,
            Err(e) => warn!("failed to purge trash: {e}"),
        }

        if report.removed + report.orphans + report.failed > 0 {
            info!(
                removed = report.removed,
                orphans = report.orphans,
                failed = report.failed,
                trash_purged = report.trash_purged,
                "upload session sweep finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use orderdesk_blob_store::{BlobStore, FsBlobStore, TRASH_DIR};
    use tempfile::TempDir;

    use super::*;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::session::metadata_key;

    struct Fixture {
        _dir: TempDir,
        clock: Arc<ManualClock>,
        sessions: SessionStore,
        sweeper: SessionSweeper,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsBlobStore::new(dir.path()).unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sessions = SessionStore::new(blobs, clock.clone(), Arc::new(SequentialIds::new()));
        Fixture {
            _dir: dir,
            clock,
            sweeper: SessionSweeper::new(sessions.clone()),
            sessions,
        }
    }

    #[test]
    fn removes_only_expired_sessions() {
        let f = fixture();
        f.sessions.create("old.bin", 1, 1).unwrap();
        f.clock.advance(Duration::hours(20));
        f.sessions.create("new.bin", 1, 1).unwrap();
        f.clock.advance(Duration::hours(5));

        let report = f.sweeper.sweep(Duration::hours(24)).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.orphans, 0);
        assert!(f.sessions.read("upload-1").unwrap().is_none());
        assert!(f.sessions.read("upload-2").unwrap().is_some());
    }

    #[test]
    fn age_is_measured_from_creation() {
        let f = fixture();
        f.sessions.create("a.bin", 2, 2).unwrap();
        f.clock.advance(Duration::hours(23));
        f.sessions
            .update("upload-1", |m| {
                m.received_chunks.insert(0);
                m.updated_at = m.created_at + Duration::hours(23);
                Ok(())
            })
            .unwrap();
        f.clock.advance(Duration::hours(1));

        let report = f.sweeper.sweep(Duration::hours(24)).unwrap();
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn young_sessions_survive() {
        let f = fixture();
        f.sessions.create("a.bin", 1, 1).unwrap();
        f.clock.advance(Duration::hours(23));
        assert_eq!(f.sweeper.sweep(Duration::hours(24)).unwrap(), SweepReport::default());
        assert!(f.sessions.read("upload-1").unwrap().is_some());
    }

    #[test]
    fn orphan_directories_are_removed() {
        let f = fixture();
        f.sessions.blobs().create_dir("chunks/stray").unwrap();
        f.sessions.create("a.bin", 1, 1).unwrap();
        f.sessions
            .blobs()
            .put(&metadata_key("upload-1"), b"garbage")
            .unwrap();

        let report = f.sweeper.sweep(Duration::hours(24)).unwrap();
        assert_eq!(report.orphans, 2);
        assert!(f.sessions.list().unwrap().is_empty());
    }

    #[test]
    fn purges_parked_trash() {
        let f = fixture();
        let blobs = f.sessions.blobs();
        let parked = blobs.path("public").unwrap().with_file_name(TRASH_DIR).join("left");
        std::fs::create_dir_all(&parked).unwrap();

        let report = f.sweeper.sweep(Duration::hours(24)).unwrap();
        assert_eq!(report.trash_purged, 1);
        assert!(!parked.exists());
    }
}
