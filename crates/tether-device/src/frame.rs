//! Frame buffers and captured frame types.

use bytes::Bytes;
use std::time::Instant;

/// Bytes per BGRA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Width and height of a decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A reusable BGRA frame buffer.
///
/// The buffer holds exactly `width * height * 4` bytes. It is reallocated
/// only when the dimensions change.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer. Storage is allocated on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zeroed buffer of the given dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        let mut buffer = Self::new();
        buffer.ensure_dimensions(width, height);
        buffer
    }

    /// Expected BGRA buffer size for given dimensions.
    pub fn bgra_buffer_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    /// Resize to the given dimensions. Returns true if storage was reallocated.
    pub fn ensure_dimensions(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height && !self.data.is_empty() {
            return false;
        }

        self.width = width;
        self.height = height;
        self.data = vec![0; Self::bgra_buffer_size(width, height)];
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> FrameDimensions {
        FrameDimensions::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel data, row-major BGRA.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Snapshot the buffer into a frame for the host.
    pub fn to_video_frame(&self, timestamp: CaptureTimestamp, sequence: u64) -> VideoFrame {
        VideoFrame::new(
            Bytes::copy_from_slice(&self.data),
            self.width,
            self.height,
            timestamp,
            sequence,
        )
    }
}

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Time since the session opened, in nanoseconds.
    pub pts_ns: u64,
}

impl CaptureTimestamp {
    /// Create a new capture timestamp.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let elapsed = capture_time.duration_since(start_time);

        Self {
            capture_time,
            pts_ns: elapsed.as_nanos() as u64,
        }
    }

    /// Get the presentation timestamp in milliseconds.
    pub fn pts_ms(&self) -> u64 {
        self.pts_ns / 1_000_000
    }
}

/// A decoded BGRA frame handed to the host.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// BGRA pixel data.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

impl VideoFrame {
    /// Create a new frame.
    pub fn new(
        data: Bytes,
        width: u32,
        height: u32,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            timestamp,
            sequence,
        }
    }

    /// Validate that the frame data matches its dimensions.
    pub fn is_valid(&self) -> bool {
        self.data.len() == FrameBuffer::bgra_buffer_size(self.width, self.height)
    }
}
