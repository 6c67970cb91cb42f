//! Seam to the device-control library.

use std::time::Duration;

use tether_ipc::DeviceDescriptor;

use crate::DriverResult;

/// Per-model capabilities known to the device-control library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAbilities {
    /// Model name, matched against enumerated device names.
    pub model: String,
}

impl ModelAbilities {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

/// A transport port known to the device-control library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port path, matched against enumerated transport addresses.
    pub path: String,

    /// Port description.
    pub name: String,
}

impl PortInfo {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

/// Location of a file stored on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFilePath {
    pub folder: String,
    pub name: String,
}

impl CameraFilePath {
    pub fn new(folder: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
        }
    }
}

/// An asynchronous device event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    /// A new file appeared on the device (e.g. the shutter was pressed on the body).
    FileAdded(CameraFilePath),

    /// Nothing happened within the timeout.
    Timeout,

    /// Any other event.
    Other,
}

/// Shape of a configuration widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetKind {
    Text,
    Range { min: f32, max: f32, step: f32 },
    Toggle,
    Radio(Vec<String>),
    Menu(Vec<String>),
    Date,
    Button,
    Section,
    Window,
}

/// Raw value held by a configuration widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetValue {
    Text(String),
    Float(f32),
    Int(i32),
    None,
}

/// A single configuration widget.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWidget {
    pub kind: WidgetKind,
    pub value: WidgetValue,
}

impl ConfigWidget {
    pub fn new(kind: WidgetKind, value: WidgetValue) -> Self {
        Self { kind, value }
    }
}

/// Entry point of the device-control library.
pub trait CameraDriver: Send + Sync {
    /// Enumerate attached cameras.
    fn autodetect(&self) -> DriverResult<Vec<DeviceDescriptor>>;

    /// Load the list of supported models.
    fn load_abilities(&self) -> DriverResult<Vec<ModelAbilities>>;

    /// Load the list of transport ports.
    fn load_ports(&self) -> DriverResult<Vec<PortInfo>>;

    /// Create an unbound device handle.
    fn create_handle(&self) -> DriverResult<Box<dyn CameraHandle>>;
}

/// An owned connection to one physical camera.
pub trait CameraHandle: Send {
    fn set_abilities(&mut self, abilities: &ModelAbilities) -> DriverResult<()>;

    fn set_port(&mut self, port: &PortInfo) -> DriverResult<()>;

    /// Start communicating with the device.
    fn init(&mut self) -> DriverResult<()>;

    /// Stop communicating with the device.
    fn exit(&mut self) -> DriverResult<()>;

    /// Grab one encoded live-view frame.
    fn capture_preview(&mut self) -> DriverResult<Vec<u8>>;

    /// Trip the shutter; returns where the image was stored.
    fn capture_image(&mut self) -> DriverResult<CameraFilePath>;

    fn file_get(&mut self, path: &CameraFilePath) -> DriverResult<Vec<u8>>;

    fn file_delete(&mut self, path: &CameraFilePath) -> DriverResult<()>;

    /// Read one configuration widget by key.
    fn get_config(&mut self, key: &str) -> DriverResult<ConfigWidget>;

    /// Write one configuration widget by key.
    fn set_config(&mut self, key: &str, value: &WidgetValue) -> DriverResult<()>;

    /// Wait at most `timeout` for the next device event.
    fn wait_for_event(&mut self, timeout: Duration) -> DriverResult<CameraEvent>;
}
