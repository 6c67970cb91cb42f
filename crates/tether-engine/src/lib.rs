//! Preview and timelapse source controllers for tethered cameras.
//!
//! A [`SourceController`] ties one [`tether_device::DeviceSession`] to the
//! host lifecycle (show, hide, update, destroy) and to the shared
//! [`tether_hotplug::HotplugMonitor`]. [`PreviewSource`] streams live-view
//! frames from a background thread; [`TimelapseSource`] takes photos on host
//! ticks and hotkey presses.

mod controller;
mod preview;
mod sink;
mod stats;
mod timelapse;

pub use controller::{CaptureContext, SourceController, SourceMode};
pub use preview::{CaptureLoop, Preview, PreviewSource};
pub use sink::{ChannelSink, FrameSink};
pub use stats::CaptureStats;
pub use timelapse::{Timelapse, TimelapseClock, TimelapseSource};

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tether_device::VideoFrame;

/// Channel capacity for frames handed to the host.
pub const FRAME_CHANNEL_CAPACITY: usize = 3;

/// Minimum time between two hotkey captures.
pub const HOTKEY_DEBOUNCE: Duration = Duration::from_millis(500);

/// Bound on the per-tick wait for a photo taken on the camera body.
pub const FILE_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest timelapse interval offered, in seconds.
pub const MAX_INTERVAL: u32 = 100_000;

/// How often capture loops log their statistics.
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Creates a bounded frame channel.
pub fn frame_channel() -> (Sender<VideoFrame>, Receiver<VideoFrame>) {
    crossbeam_channel::bounded(FRAME_CHANNEL_CAPACITY)
}
