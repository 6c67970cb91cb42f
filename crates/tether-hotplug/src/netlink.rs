//! udev netlink event channel.

use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use tracing::{debug, trace};

use crate::event::RawDeviceInfo;
use crate::{EventChannel, EventStream};

/// Device-event channel backed by a udev monitor socket.
#[derive(Debug, Clone)]
pub struct UdevChannel {
    subsystem: String,
}

impl UdevChannel {
    /// Watch devices of the given subsystem.
    pub fn new(subsystem: &str) -> Self {
        Self {
            subsystem: subsystem.to_string(),
        }
    }
}

impl EventChannel for UdevChannel {
    fn open(&self) -> io::Result<Box<dyn EventStream>> {
        let socket = ::udev::MonitorBuilder::new()?
            .match_subsystem(&self.subsystem)?
            .listen()?;

        debug!(subsystem = %self.subsystem, "udev monitor listening");
        Ok(Box::new(UdevStream { socket }))
    }

    fn name(&self) -> &'static str {
        "udev"
    }
}

struct UdevStream {
    socket: ::udev::MonitorSocket,
}

impl EventStream for UdevStream {
    fn poll(&mut self, timeout: Duration) -> io::Result<Vec<RawDeviceInfo>> {
        let mut fds = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let ready = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }
        if ready == 0 {
            return Ok(Vec::new());
        }

        let events: Vec<RawDeviceInfo> = self
            .socket
            .iter()
            .map(|event| RawDeviceInfo {
                action: event.action().map(|a| a.to_string_lossy().into_owned()),
                subsystem: event.subsystem().map(|s| s.to_string_lossy().into_owned()),
                sysname: event.sysname().to_string_lossy().into_owned(),
                devnode: event.devnode().map(|p| p.to_path_buf()),
            })
            .collect();

        trace!(count = events.len(), "udev events received");
        Ok(events)
    }
}
