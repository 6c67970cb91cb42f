//! Hotplug event types.

use std::path::PathBuf;

/// A raw event as read from the device-event channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDeviceInfo {
    /// Action string (`add`, `remove`, `bind`, ...).
    pub action: Option<String>,

    /// Kernel subsystem of the device.
    pub subsystem: Option<String>,

    /// Kernel name of the device.
    pub sysname: String,

    /// Device node, if any.
    pub devnode: Option<PathBuf>,
}

impl RawDeviceInfo {
    /// Create an event with the given action and kernel name.
    pub fn new(action: &str, sysname: impl Into<String>) -> Self {
        Self {
            action: Some(action.to_string()),
            sysname: sysname.into(),
            ..Default::default()
        }
    }
}

/// Classified action of a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugAction {
    Added,
    Removed,
    Unknown,
}

impl HotplugAction {
    /// Classify an action string.
    pub fn from_action(action: Option<&str>) -> Self {
        match action {
            Some(action) if action.starts_with("add") => Self::Added,
            Some(action) if action.starts_with("remove") => Self::Removed,
            _ => Self::Unknown,
        }
    }
}

/// Kind of event a subscriber listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotplugKind {
    Added,
    Removed,
}

/// A classified attach/detach notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    Added(RawDeviceInfo),
    Removed(RawDeviceInfo),
}

impl HotplugEvent {
    /// Classify a raw event. Unknown actions yield `None`.
    pub fn classify(raw: RawDeviceInfo) -> Option<Self> {
        match HotplugAction::from_action(raw.action.as_deref()) {
            HotplugAction::Added => Some(Self::Added(raw)),
            HotplugAction::Removed => Some(Self::Removed(raw)),
            HotplugAction::Unknown => None,
        }
    }

    /// The subscriber kind this event is delivered to.
    pub fn kind(&self) -> HotplugKind {
        match self {
            Self::Added(_) => HotplugKind::Added,
            Self::Removed(_) => HotplugKind::Removed,
        }
    }

    /// The underlying device information.
    pub fn device(&self) -> &RawDeviceInfo {
        match self {
            Self::Added(raw) | Self::Removed(raw) => raw,
        }
    }
}
