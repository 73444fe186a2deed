//! Progress tracking for pack and unpack runs.
//!
//! Completions are observed on the coordinating thread only, so the tracker is plain
//! counters; callers get a [`ProgressState`] snapshot per finished file.

use std::time::{Duration, Instant};

/// Current progress state, emitted once per completed file.
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub elapsed_time: Duration,
    pub speed_mbps: f32,
    pub progress_percent: f32,
}

impl ProgressState {
    /// Calculate estimated time remaining based on current speed
    pub fn estimated_time_remaining(&self) -> Duration {
        if self.speed_mbps <= 0.0 {
            return Duration::from_secs(0);
        }

        let remaining_bytes = self.total_bytes.saturating_sub(self.processed_bytes);
        let remaining_mb = remaining_bytes as f32 / (1024.0 * 1024.0);
        let remaining_seconds = remaining_mb / self.speed_mbps;

        Duration::from_secs_f32(remaining_seconds.max(0.0))
    }
}

/// Progress callback function type
pub type ProgressCallback = dyn Fn(ProgressState) + Send + Sync;

pub struct ProgressTracker {
    start: Instant,
    total_files: u64,
    total_bytes: u64,
    processed_files: u64,
    failed_files: u64,
    processed_bytes: u64,
}

impl ProgressTracker {
    pub fn new(total_files: u64, total_bytes: u64) -> Self {
        Self {
            start: Instant::now(),
            total_files,
            total_bytes,
            processed_files: 0,
            failed_files: 0,
            processed_bytes: 0,
        }
    }

    /// Records one finished file; `bytes` is `None` when the file failed.
    pub fn record(&mut self, bytes: Option<u64>) -> ProgressState {
        self.processed_files += 1;
        match bytes {
            Some(n) => self.processed_bytes += n,
            None => self.failed_files += 1,
        }
        self.state()
    }

    pub fn state(&self) -> ProgressState {
        let elapsed_time = self.start.elapsed();
        let secs = elapsed_time.as_secs_f32();
        let speed_mbps = if secs > 0.0 {
            (self.processed_bytes as f32 / (1024.0 * 1024.0)) / secs
        } else {
            0.0
        };
        // Byte-weighted when there are bytes to move, file-weighted otherwise.
        let progress_percent = if self.total_bytes > 0 {
            self.processed_bytes as f32 * 100.0 / self.total_bytes as f32
        } else if self.total_files > 0 {
            self.processed_files as f32 * 100.0 / self.total_files as f32
        } else {
            100.0
        };
        ProgressState {
            total_files: self.total_files,
            processed_files: self.processed_files,
            failed_files: self.failed_files,
            total_bytes: self.total_bytes,
            processed_bytes: self.processed_bytes,
            elapsed_time,
            speed_mbps,
            progress_percent: progress_percent.min(100.0),
        }
    }
}
