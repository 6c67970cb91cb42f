//! Common types shared between the host and the source controllers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SettingsError;
use crate::SettingsResult;

/// Persisted source settings, as stored by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Display name of the selected camera (empty when none is selected).
    pub camera_name: String,

    /// Preview cadence in frames per second.
    pub fps: u32,

    /// Timelapse interval in seconds (0 disables scheduled captures).
    pub interval: u32,

    /// Whether the autofocus drive should be enabled after opening.
    #[serde(rename = "autofocusdrive")]
    pub autofocus: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            camera_name: String::new(),
            fps: 30,
            interval: 30,
            autofocus: false,
        }
    }
}

impl SourceSettings {
    /// Parse settings from the host's JSON settings object.
    ///
    /// Keys this crate does not know about (the `changed` tag, device
    /// property overrides) are ignored.
    pub fn from_json(value: &Value) -> SettingsResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Returns true if a camera has been selected.
    pub fn has_camera(&self) -> bool {
        !self.camera_name.is_empty()
    }
}

/// A device found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Model / display name reported by the device library.
    pub name: String,

    /// Transport address (e.g. `usb:001,004`).
    pub transport_address: String,
}

impl DeviceDescriptor {
    /// Create a new descriptor.
    pub fn new(name: impl Into<String>, transport_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport_address: transport_address.into(),
        }
    }
}

/// Preview frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameRate {
    Fps25,
    Fps30,
    Fps60,
    /// Used for any unrecognized value.
    Fallback,
}

impl FrameRate {
    /// Frame rates offered to the user.
    pub const CHOICES: [u32; 3] = [25, 30, 60];

    /// Map a stored fps value to a supported frame rate.
    pub fn from_fps(fps: u32) -> Self {
        match fps {
            25 => Self::Fps25,
            30 => Self::Fps30,
            60 => Self::Fps60,
            _ => Self::Fallback,
        }
    }

    /// Frames per second.
    pub fn fps(self) -> u32 {
        match self {
            Self::Fps25 => 25,
            Self::Fps30 => 30,
            Self::Fps60 => 60,
            Self::Fallback => 20,
        }
    }

    /// Time between two frame deadlines.
    pub fn period(self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.fps()))
    }
}

/// Discrete manual focus steps, as exposed by seven-choice focus drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FocusStep {
    Near3,
    Near2,
    Near1,
    Neutral,
    Far1,
    Far2,
    Far3,
}

impl FocusStep {
    /// All steps, nearest first.
    pub const ALL: [FocusStep; 7] = [
        Self::Near3,
        Self::Near2,
        Self::Near1,
        Self::Neutral,
        Self::Far1,
        Self::Far2,
        Self::Far3,
    ];

    /// The choice label the device uses for this step.
    pub fn label(self) -> &'static str {
        match self {
            Self::Near3 => "Near 3",
            Self::Near2 => "Near 2",
            Self::Near1 => "Near 1",
            Self::Neutral => "None",
            Self::Far1 => "Far 1",
            Self::Far2 => "Far 2",
            Self::Far3 => "Far 3",
        }
    }

    /// Parse a device choice label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.label() == label)
    }
}

/// A manual focus request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ManualFocus {
    /// Drive by a discrete step.
    Step(FocusStep),

    /// Drive to a position on a continuous range.
    Position(f32),
}

impl ManualFocus {
    /// Parse the host's `manualfocusdrive` value (step label or number).
    pub fn from_json(key: &str, value: &Value) -> SettingsResult<Self> {
        match value {
            Value::String(label) => FocusStep::from_label(label)
                .map(Self::Step)
                .ok_or_else(|| SettingsError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("unknown focus step `{label}`"),
                }),
            Value::Number(n) => n
                .as_f64()
                .map(|position| Self::Position(position as f32))
                .ok_or_else(|| SettingsError::InvalidValue {
                    key: key.to_string(),
                    reason: "focus position is not a finite number".to_string(),
                }),
            other => Err(SettingsError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected step label or number, got {other}"),
            }),
        }
    }
}

/// The value of a device property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Toggle(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    /// Convert a host JSON value.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Toggle(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Get the value as text, converting numbers and toggles.
    pub fn to_text(&self) -> String {
        match self {
            Self::Toggle(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Shape of a device property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Free text.
    Text,

    /// Continuous numeric range.
    Range { min: f32, max: f32, step: f32 },

    /// On/off switch.
    Toggle,

    /// One of a fixed list of options.
    Choice(Vec<String>),
}

/// Typed description of one device setting plus its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Shape of the setting.
    pub kind: PropertyKind,

    /// Current value on the device.
    pub current: PropertyValue,
}

/// One device property entry of a property sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperty {
    /// Device configuration key (also the host settings key).
    pub key: String,

    /// Display label.
    pub label: String,

    /// Descriptor read from the device.
    pub descriptor: PropertyDescriptor,
}

/// Cadence control shown for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CadenceControl {
    /// Preview frame rate list.
    FrameRate { choices: Vec<u32>, current: u32 },

    /// Timelapse interval in seconds.
    Interval { min: u32, max: u32, step: u32, current: u32 },
}

/// Manual focus control shown for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ManualFocusControl {
    /// One button per step.
    Steps(Vec<FocusStep>),

    /// Slider over a continuous range.
    Range { min: f32, max: f32, step: f32, current: f32 },
}

/// Everything the host needs to build the settings UI of a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySheet {
    /// Names of the cameras currently attached.
    pub cameras: Vec<String>,

    /// Cadence control (absent when no camera is attached).
    pub cadence: Option<CadenceControl>,

    /// Autofocus toggle state, if the open device has an autofocus drive.
    pub autofocus: Option<bool>,

    /// Manual focus control, if the open device has a focus drive.
    pub manual_focus: Option<ManualFocusControl>,

    /// Device properties readable on the open device.
    pub properties: Vec<DeviceProperty>,

    /// Whether a test capture button should be offered.
    pub test_capture: bool,
}

/// Capture statistics for a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetrics {
    /// Frames captured and published since the session opened.
    pub frames_captured: u64,

    /// Failed capture attempts since the session opened.
    pub capture_failures: u64,

    /// Measured frames per second since the last report.
    pub fps: f32,

    /// Configured frames per second (0 for timelapse sources).
    pub target_fps: f32,

    /// Seconds since the session opened.
    pub uptime_seconds: u64,
}
