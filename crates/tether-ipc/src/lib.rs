//! Typed host<->source messages for tethered camera sources.
//!
//! This crate defines the values exchanged between the host media framework
//! and the camera source controllers: update commands, events, settings and
//! the property sheet used to build settings UI.

mod commands;
mod error;
mod events;
mod state;
mod types;

pub use commands::SourceCommand;
pub use error::SettingsError;
pub use events::SourceEvent;
pub use state::SourceState;
pub use types::{
    CadenceControl, CaptureMetrics, DeviceDescriptor, DeviceProperty, FocusStep, FrameRate,
    ManualFocus, ManualFocusControl, PropertyDescriptor, PropertyKind, PropertySheet,
    PropertyValue, SourceSettings,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for events (source → host).
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result type for settings parsing.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<SourceEvent>, Receiver<SourceEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
