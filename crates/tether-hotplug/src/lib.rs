//! Reference-counted device attach/detach monitor.
//!
//! A [`HotplugMonitor`] owns one background thread that listens on a
//! device-event channel (udev on Linux) and fans classified attach/detach
//! events out to subscribers. Each user calls [`HotplugMonitor::acquire`]
//! and [`HotplugMonitor::release`]; the thread runs while the reference count
//! is non-zero.

mod channel;
mod error;
mod event;
mod monitor;
#[cfg(target_os = "linux")]
mod netlink;

pub use channel::{system_channel, InertChannel, ManualChannel};
pub use error::HotplugError;
pub use event::{HotplugAction, HotplugEvent, HotplugKind, RawDeviceInfo};
pub use monitor::{HotplugCallback, HotplugMonitor, MonitorConfig, SubscriptionId};
#[cfg(target_os = "linux")]
pub use netlink::UdevChannel;

use std::io;
use std::time::Duration;

/// Device subsystem watched by default.
pub const USB_SUBSYSTEM: &str = "usb";

/// Default bound on a single channel poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result type for hotplug operations.
pub type HotplugResult<T> = Result<T, HotplugError>;

/// A source of raw device events.
pub trait EventChannel: Send + Sync + 'static {
    /// Open the channel. Called on the monitor thread.
    fn open(&self) -> io::Result<Box<dyn EventStream>>;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

/// An open device-event stream.
pub trait EventStream {
    /// Wait at most `timeout` for events and return those that arrived.
    fn poll(&mut self, timeout: Duration) -> io::Result<Vec<RawDeviceInfo>>;
}
