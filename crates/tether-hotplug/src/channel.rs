//! Event channel implementations.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::event::RawDeviceInfo;
use crate::{EventChannel, EventStream};

/// The platform's device-event channel.
///
/// On Linux this is a udev monitor filtered on `subsystem`; elsewhere the
/// channel is inert and the monitor never reports anything.
#[cfg(target_os = "linux")]
pub fn system_channel(subsystem: &str) -> Arc<dyn EventChannel> {
    Arc::new(crate::netlink::UdevChannel::new(subsystem))
}

/// The platform's device-event channel.
#[cfg(not(target_os = "linux"))]
pub fn system_channel(_subsystem: &str) -> Arc<dyn EventChannel> {
    Arc::new(InertChannel)
}

/// A channel that always fails to open.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertChannel;

impl EventChannel for InertChannel {
    fn open(&self) -> io::Result<Box<dyn EventStream>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no device-event channel on this platform",
        ))
    }

    fn name(&self) -> &'static str {
        "inert"
    }
}

/// A channel fed by hand through a sender.
///
/// Useful for hosts that learn about attach/detach by other means, and for
/// tests.
#[derive(Debug, Clone)]
pub struct ManualChannel {
    receiver: Receiver<RawDeviceInfo>,
}

impl ManualChannel {
    /// Create a channel and the sender that feeds it.
    pub fn new() -> (Self, Sender<RawDeviceInfo>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { receiver }, sender)
    }
}

impl EventChannel for ManualChannel {
    fn open(&self) -> io::Result<Box<dyn EventStream>> {
        Ok(Box::new(ManualStream {
            receiver: self.receiver.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

struct ManualStream {
    receiver: Receiver<RawDeviceInfo>,
}

impl EventStream for ManualStream {
    fn poll(&mut self, timeout: Duration) -> io::Result<Vec<RawDeviceInfo>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(first) => {
                let mut events = vec![first];
                events.extend(self.receiver.try_iter());
                Ok(events)
            }
            Err(RecvTimeoutError::Timeout) => Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => {
                // Nobody can feed us anymore; keep the poll bounded.
                thread::sleep(timeout);
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inert_channel_fails_to_open() {
        assert!(InertChannel.open().is_err());
    }

    #[test]
    fn test_manual_stream_drains_pending_events() {
        let (channel, sender) = ManualChannel::new();
        let mut stream = channel.open().unwrap();

        sender.send(RawDeviceInfo::new("add", "1-1")).unwrap();
        sender.send(RawDeviceInfo::new("remove", "1-1")).unwrap();

        let events = stream.poll(Duration::from_millis(50)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(stream.poll(Duration::from_millis(10)).unwrap().is_empty());
    }
}
