//! Injected time and identifier sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of generated storage file stems.
const FILE_STEM_LEN: usize = 40;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jumps the clock to `to`.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Source of session ids and randomized storage file names.
pub trait IdSource: Send + Sync + 'static {
    /// A fresh upload session id (at least 122 bits of randomness).
    fn session_id(&self) -> String;

    /// A fresh stem for a finalized file name.
    fn file_stem(&self) -> String;
}

/// CSPRNG-backed ids: UUIDv4 sessions and 40-char alphanumeric stems.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn session_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn file_stem(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(FILE_STEM_LEN)
            .map(char::from)
            .collect()
    }
}

/// Predictable ids (`upload-1`, `file-1`, ...) for reproducible runs.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIds {
    fn session_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("upload-{n}")
    }

    fn file_stem(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("file-{n}")
    }
}
