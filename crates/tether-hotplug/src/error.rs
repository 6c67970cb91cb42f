//! Error types for the hotplug module.

use thiserror::Error;

/// Errors that can occur while running the hotplug monitor.
#[derive(Debug, Error)]
pub enum HotplugError {
    /// The device-event channel could not be opened.
    #[error("Failed to open {channel} event channel: {source}")]
    ChannelOpen {
        channel: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Polling the channel failed.
    #[error("Failed to poll {channel} event channel: {source}")]
    ChannelPoll {
        channel: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The monitor thread could not be spawned.
    #[error("Failed to spawn monitor thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Release was called more often than acquire.
    #[error("Hotplug monitor released without a matching acquire")]
    Unbalanced,
}
