use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Snapshot of an upload's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadProgress {
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    /// Rounded to the nearest whole percent.
    pub percentage: u8,
    /// Estimated from whole chunks, capped at `total_bytes`.
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
}

impl UploadProgress {
    /// Computes progress from chunk counts.
    pub fn new(uploaded_chunks: u32, total_chunks: u32, chunk_size: u64, total_bytes: u64) -> Self {
        let percentage = if total_chunks > 0 {
            (f64::from(uploaded_chunks) / f64::from(total_chunks) * 100.0).round() as u8
        } else {
            0
        };
        let uploaded_bytes = (u64::from(uploaded_chunks) * chunk_size).min(total_bytes);
        Self {
            uploaded_chunks,
            total_chunks,
            percentage,
            uploaded_bytes,
            total_bytes,
            bytes_per_second: 0.0,
            eta: None,
        }
    }

    /// Adds speed and ETA from `speed`.
    pub fn with_speed(mut self, speed: &SpeedCalculator) -> Self {
        self.bytes_per_second = speed.bytes_per_second();
        self.eta = speed.eta(self.total_bytes - self.uploaded_bytes);
        self
    }

    pub fn is_done(&self) -> bool {
        self.total_chunks > 0 && self.uploaded_chunks == self.total_chunks
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    fn add_sample_at(&self, bytes: u64, now: Instant) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.samples.clear();
    }
}
