//! Host-facing output of a source.

use crossbeam_channel::{Receiver, Sender};
use tether_device::VideoFrame;
use tether_ipc::SourceEvent;
use tracing::{trace, warn};

/// Receives frames and events from a source controller.
///
/// Called from the capture thread and the hotplug monitor thread as well as
/// the host's own threads.
pub trait FrameSink: Send + Sync {
    /// Deliver a decoded frame.
    fn output_frame(&self, frame: VideoFrame);

    /// Deliver a state change, redraw request or error.
    fn send_event(&self, event: SourceEvent);
}

/// A sink backed by bounded channels. Frames and events are dropped when
/// the host falls behind.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    frames: Sender<VideoFrame>,
    events: Sender<SourceEvent>,
}

impl ChannelSink {
    /// Create a sink and the receivers the host reads from.
    pub fn new() -> (Self, Receiver<VideoFrame>, Receiver<SourceEvent>) {
        let (frames, frame_rx) = crate::frame_channel();
        let (events, event_rx) = tether_ipc::event_channel();
        (Self { frames, events }, frame_rx, event_rx)
    }
}

impl FrameSink for ChannelSink {
    fn output_frame(&self, frame: VideoFrame) {
        if let Err(e) = self.frames.try_send(frame) {
            trace!("Dropped frame: {}", e);
        }
    }

    fn send_event(&self, event: SourceEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}
