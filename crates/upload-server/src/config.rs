//! Runtime settings for the upload service.

use std::time::Duration;

use orderdesk_transfer::UploadLimits;

/// Default lifetime of a completion lease.
pub const DEFAULT_COMPLETION_LEASE: Duration = Duration::from_secs(300);

/// Merge throughput (bytes per second) assumed when sizing a completion
/// lease. The lease grows by one second per this many bytes.
pub const LEASE_MERGE_THROUGHPUT: u64 = 8 * 1024 * 1024;

/// Route finalized files are served under.
pub const PUBLIC_ROUTE: &str = "/storage";

/// Default age after which an unfinished session is reclaimed.
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Shortest pause between sweeps; shorter intervals are raised to this.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for [`UploadService`](crate::UploadService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL finalized files are served under, without a trailing slash.
    pub public_base_url: String,
    pub limits: UploadLimits,
    /// Base time a `complete` call owns its session; see
    /// [`completion_lease_for`](Self::completion_lease_for).
    pub completion_lease: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".into(),
            limits: UploadLimits::default(),
            completion_lease: DEFAULT_COMPLETION_LEASE,
        }
    }
}

impl ServiceConfig {
    /// Completion lease for a file of `file_size` bytes: the base lease plus
    /// the time a merge takes at [`LEASE_MERGE_THROUGHPUT`].
    pub fn completion_lease_for(&self, file_size: u64) -> Duration {
        let merge = Duration::from_secs(file_size.div_ceil(LEASE_MERGE_THROUGHPUT));
        self.completion_lease.saturating_add(merge)
    }

    /// Public URL of a file stored at `file_path` (relative to the public root).
    pub fn public_url(&self, file_path: &str) -> String {
        format!(
            "{}{PUBLIC_ROUTE}/{}",
            self.public_base_url.trim_end_matches('/'),
            file_path
        )
    }
}

/// Settings for the background session sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub interval: Duration,
    pub max_age: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            max_age: DEFAULT_SESSION_MAX_AGE,
        }
    }
}
