//! Live-view preview capture.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tether_device::{CaptureKind, CaptureTimestamp, FrameBuffer};
use tether_ipc::{CadenceControl, FrameRate, SourceEvent, SourceSettings};
use tracing::{debug, error, info, warn};

use crate::controller::{CaptureContext, SourceController, SourceMode};
use crate::STATS_LOG_INTERVAL;

/// A preview source.
pub type PreviewSource = SourceController<Preview>;

/// Background thread pulling preview frames at a fixed cadence.
///
/// Each iteration sleeps until an absolute deadline one period after the
/// iteration started; stopping wakes it immediately.
pub struct CaptureLoop {
    thread: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
    fps: Arc<AtomicU32>,
}

impl CaptureLoop {
    /// Start pulling frames from an open session.
    pub fn start(capture: CaptureContext, fps: u32) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let fps = Arc::new(AtomicU32::new(fps));
        let shared_fps = Arc::clone(&fps);

        let thread = thread::Builder::new()
            .name("preview-capture".to_string())
            .spawn(move || capture_loop(capture, stop_rx, shared_fps))?;

        Ok(Self {
            thread: Some(thread),
            stop_tx: Some(stop_tx),
            fps,
        })
    }

    /// Change the cadence; takes effect from the next frame.
    pub fn set_fps(&self, fps: u32) {
        self.fps.store(fps, Ordering::SeqCst);
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::SeqCst)
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Preview capture thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(capture: CaptureContext, stop_rx: Receiver<()>, fps: Arc<AtomicU32>) {
    debug!("Preview loop starting");

    let start_time = Instant::now();
    let mut buffer = FrameBuffer::new();
    let mut sequence: u64 = 0;
    let mut last_log_time = Instant::now();

    loop {
        let frame_start = Instant::now();
        let rate = FrameRate::from_fps(fps.load(Ordering::SeqCst));

        // Periodic status logging every 5 seconds
        if last_log_time.elapsed() >= STATS_LOG_INTERVAL {
            let metrics = capture.stats.snapshot(rate.fps() as f32);
            info!(
                "Preview stats: captured={}, failed={}, fps={:.1}, target={}, uptime={}s",
                metrics.frames_captured,
                metrics.capture_failures,
                metrics.fps,
                rate.fps(),
                metrics.uptime_seconds
            );
            capture.stats.mark_reported();
            last_log_time = Instant::now();
        }

        match capture.session.capture_into(CaptureKind::Preview, &mut buffer) {
            Ok(dimensions) => {
                sequence += 1;
                capture.stats.record_frame(dimensions);
                let timestamp = CaptureTimestamp::now(start_time);
                capture
                    .sink
                    .output_frame(buffer.to_video_frame(timestamp, sequence));
            }
            Err(e) => {
                capture.stats.record_failure();
                warn!("Preview capture failed: {}", e);
            }
        }

        match stop_rx.recv_deadline(frame_start + rate.period()) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(frames = sequence, "Preview loop stopped");
}

/// Preview mode: a capture thread runs while the session is open.
pub struct Preview {
    capture: Option<CaptureLoop>,
    fps: u32,
}

impl Preview {
    /// Whether the capture thread is running.
    pub fn is_capturing(&self) -> bool {
        self.capture.as_ref().is_some_and(CaptureLoop::is_running)
    }
}

impl SourceMode for Preview {
    const NAME: &'static str = "preview";

    const PROPERTIES: &'static [(&'static str, &'static str)] = &[
        ("shutterspeed", "Shutter Speed"),
        ("aperture", "Aperture"),
        ("iso", "ISO"),
        ("whitebalance", "White Balance"),
        ("picturestyle", "Picture Style"),
    ];

    const TEST_CAPTURE: bool = false;

    fn new(settings: &SourceSettings) -> Self {
        Self {
            capture: None,
            fps: settings.fps,
        }
    }

    fn cadence(settings: &SourceSettings) -> CadenceControl {
        CadenceControl::FrameRate {
            choices: FrameRate::CHOICES.to_vec(),
            current: FrameRate::from_fps(settings.fps).fps(),
        }
    }

    fn target_fps(settings: &SourceSettings) -> f32 {
        FrameRate::from_fps(settings.fps).fps() as f32
    }

    fn opened(&mut self, capture: &CaptureContext, settings: &SourceSettings) {
        self.fps = settings.fps;
        match CaptureLoop::start(capture.clone(), self.fps) {
            Ok(started) => self.capture = Some(started),
            Err(e) => {
                error!("Failed to start preview thread: {}", e);
                capture.sink.send_event(SourceEvent::Error {
                    recoverable: true,
                    message: format!("Failed to start preview thread: {}", e),
                });
            }
        }
    }

    fn closing(&mut self) {
        if let Some(mut running) = self.capture.take() {
            running.stop();
        }
    }

    fn cadence_changed(&mut self, settings: &SourceSettings) {
        self.fps = settings.fps;
        if let Some(running) = &self.capture {
            running.set_fps(self.fps);
        }
    }
}

impl SourceController<Preview> {
    /// Whether the preview thread is running.
    pub fn is_capturing(&self) -> bool {
        self.shared.state.lock().mode.is_capturing()
    }

    /// The fps the preview thread is pacing to.
    pub fn capture_fps(&self) -> u32 {
        FrameRate::from_fps(self.shared.state.lock().mode.fps).fps()
    }
}
