//! Capture statistics.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use tether_device::FrameDimensions;
use tether_ipc::CaptureMetrics;

/// Collects per-source capture statistics.
pub struct CaptureStats {
    start_time: RwLock<Option<Instant>>,
    frame_count: AtomicU64,
    failure_count: AtomicU64,
    last_report_time: RwLock<Instant>,
    last_frame_count: AtomicU64,
    width: AtomicU32,
    height: AtomicU32,
}

impl CaptureStats {
    /// Create an idle collector with zero dimensions.
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(None),
            frame_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_report_time: RwLock::new(Instant::now()),
            last_frame_count: AtomicU64::new(0),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
        }
    }

    /// Reset counters for a newly opened session.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
        *self.last_report_time.write() = Instant::now();
        self.frame_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.last_frame_count.store(0, Ordering::Relaxed);
    }

    /// Mark the session closed. Dimensions drop to zero until the next frame.
    pub fn stop(&self) {
        *self.start_time.write() = None;
        self.width.store(0, Ordering::Relaxed);
        self.height.store(0, Ordering::Relaxed);
    }

    /// Record a published frame.
    pub fn record_frame(&self, dimensions: FrameDimensions) {
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        self.width.store(dimensions.width, Ordering::Relaxed);
        self.height.store(dimensions.height, Ordering::Relaxed);
    }

    /// Record a failed capture attempt.
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Dimensions of the last published frame (zero before the first one).
    pub fn dimensions(&self) -> FrameDimensions {
        FrameDimensions::new(
            self.width.load(Ordering::Relaxed),
            self.height.load(Ordering::Relaxed),
        )
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self, target_fps: f32) -> CaptureMetrics {
        let now = Instant::now();

        let elapsed = now.duration_since(*self.last_report_time.read());
        let current_frames = self.frame_count.load(Ordering::Relaxed);
        let last_frames = self.last_frame_count.load(Ordering::Relaxed);

        let fps = if elapsed.as_secs_f32() > 0.0 {
            current_frames.saturating_sub(last_frames) as f32 / elapsed.as_secs_f32()
        } else {
            0.0
        };

        let uptime_seconds = self
            .start_time
            .read()
            .map(|s| now.duration_since(s).as_secs())
            .unwrap_or(0);

        CaptureMetrics {
            frames_captured: current_frames,
            capture_failures: self.failure_count.load(Ordering::Relaxed),
            fps,
            target_fps,
            uptime_seconds,
        }
    }

    /// Update last report time for FPS calculation.
    pub fn mark_reported(&self) {
        *self.last_report_time.write() = Instant::now();
        self.last_frame_count
            .store(self.frame_count.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}
