//! Timelapse capture driven by host ticks.

use std::time::Instant;

use tether_device::{CaptureKind, CaptureTimestamp, DeviceResult, FrameBuffer, FrameDimensions};
use tether_ipc::{CadenceControl, SourceEvent, SourceSettings};
use tracing::{debug, error, instrument, warn};

use crate::controller::{CaptureContext, ControllerState, Shared, SourceController, SourceMode};
use crate::{FILE_WAIT_TIMEOUT, HOTKEY_DEBOUNCE, MAX_INTERVAL};

/// A timelapse source.
pub type TimelapseSource = SourceController<Timelapse>;

/// Interval accumulator and hotkey debounce.
#[derive(Debug, Clone)]
pub struct TimelapseClock {
    interval: u32,
    elapsed: f32,
    last_capture: Option<Instant>,
}

impl TimelapseClock {
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            elapsed: 0.0,
            last_capture: None,
        }
    }

    pub fn set_interval(&mut self, interval: u32) {
        self.interval = interval;
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Seconds accumulated since the last scheduled capture.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Add `seconds`. Returns true when a scheduled capture is due, in which
    /// case the accumulator restarts from zero.
    pub fn advance(&mut self, seconds: f32) -> bool {
        self.elapsed += seconds;
        if self.interval > 0 && self.elapsed >= self.interval as f32 {
            self.elapsed = 0.0;
            true
        } else {
            false
        }
    }

    /// Whether a hotkey capture at `now` clears the debounce window.
    pub fn hotkey_ready(&self, now: Instant) -> bool {
        self.last_capture
            .map_or(true, |last| now.duration_since(last) >= HOTKEY_DEBOUNCE)
    }

    pub fn mark_captured(&mut self, now: Instant) {
        self.last_capture = Some(now);
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.last_capture = None;
    }
}

/// Timelapse mode: photos on a schedule, on hotkey, or when the camera
/// produces one by itself.
pub struct Timelapse {
    clock: TimelapseClock,
    buffer: FrameBuffer,
    sequence: u64,
    opened_at: Instant,
}

impl Timelapse {
    pub fn clock(&self) -> &TimelapseClock {
        &self.clock
    }

    /// Take a photo into the frame buffer and publish it.
    fn take_photo(&mut self, capture: &CaptureContext) -> DeviceResult<FrameDimensions> {
        let dimensions = capture
            .session
            .capture_into(CaptureKind::Photo, &mut self.buffer)?;
        debug!(width = dimensions.width, height = dimensions.height, "Photo captured");
        self.publish(capture);
        Ok(dimensions)
    }

    fn publish(&mut self, capture: &CaptureContext) {
        self.sequence += 1;
        capture.stats.record_frame(self.buffer.dimensions());
        let timestamp = CaptureTimestamp::now(self.opened_at);
        capture
            .sink
            .output_frame(self.buffer.to_video_frame(timestamp, self.sequence));
    }
}

impl SourceMode for Timelapse {
    const NAME: &'static str = "timelapse";

    const PROPERTIES: &'static [(&'static str, &'static str)] = &[
        ("shutterspeed", "Shutter Speed"),
        ("aperture", "Aperture"),
        ("iso", "ISO"),
        ("whitebalance", "White Balance"),
        ("picturestyle", "Picture Style"),
        ("imageformat", "Image Format"),
    ];

    const TEST_CAPTURE: bool = true;

    fn new(settings: &SourceSettings) -> Self {
        Self {
            clock: TimelapseClock::new(settings.interval),
            buffer: FrameBuffer::new(),
            sequence: 0,
            opened_at: Instant::now(),
        }
    }

    fn cadence(settings: &SourceSettings) -> CadenceControl {
        CadenceControl::Interval {
            min: 0,
            max: MAX_INTERVAL,
            step: 1,
            current: settings.interval,
        }
    }

    fn target_fps(_settings: &SourceSettings) -> f32 {
        0.0
    }

    fn opened(&mut self, capture: &CaptureContext, settings: &SourceSettings) {
        self.clock.set_interval(settings.interval);
        self.clock.reset();
        self.sequence = 0;
        self.opened_at = Instant::now();

        // First photo sizes the source right away.
        if let Err(e) = self.take_photo(capture) {
            capture.stats.record_failure();
            error!("Initial photo failed: {}", e);
            capture.sink.send_event(SourceEvent::Error {
                recoverable: e.is_recoverable(),
                message: e.to_string(),
            });
        }
    }

    fn closing(&mut self) {}

    fn cadence_changed(&mut self, settings: &SourceSettings) {
        self.clock.set_interval(settings.interval);
    }
}

impl Shared<Timelapse> {
    fn capture_photo(&self, state: &mut ControllerState<Timelapse>) -> bool {
        let mode = &mut state.mode;
        mode.clock.mark_captured(Instant::now());

        match mode.take_photo(&self.capture) {
            Ok(_) => true,
            Err(e) => {
                self.capture.stats.record_failure();
                self.report("capture photo", &e);
                false
            }
        }
    }
}

impl SourceController<Timelapse> {
    /// Advance the schedule by `seconds` of host time.
    ///
    /// Captures when the interval has elapsed; otherwise briefly waits for a
    /// photo taken on the camera body and publishes it.
    pub fn tick(&self, seconds: f32) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.destroyed || !state.source.is_open() {
            return;
        }

        if state.mode.clock.advance(seconds) {
            shared.capture_photo(&mut state);
            return;
        }

        let mode = &mut state.mode;
        match shared
            .capture
            .session
            .wait_for_file(FILE_WAIT_TIMEOUT, &mut mode.buffer)
        {
            Ok(Some(_)) => mode.publish(&shared.capture),
            Ok(None) => {}
            Err(e) => {
                shared.capture.stats.record_failure();
                warn!("Waiting for camera file failed: {}", e);
            }
        }
    }

    /// Capture on hotkey press, at most once per debounce window.
    ///
    /// Returns true if a photo was published.
    #[instrument(name = "timelapse_hotkey", skip(self))]
    pub fn hotkey_pressed(&self, pressed: bool) -> bool {
        if !pressed {
            return false;
        }

        let shared = &self.shared;
        let mut state = shared.state.lock();
        if !state.active || !state.source.is_open() {
            return false;
        }
        if !state.mode.clock.hotkey_ready(Instant::now()) {
            debug!("Hotkey within debounce window");
            return false;
        }

        shared.capture_photo(&mut state)
    }

    /// Capture immediately, ignoring the debounce window.
    ///
    /// Returns true if a photo was published.
    #[instrument(name = "timelapse_test_capture", skip(self))]
    pub fn test_capture(&self) -> bool {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.destroyed || !state.source.is_open() {
            return false;
        }

        shared.capture_photo(&mut state)
    }

    /// Seconds accumulated toward the next scheduled capture.
    pub fn elapsed(&self) -> f32 {
        self.shared.state.lock().mode.clock.elapsed()
    }
}
