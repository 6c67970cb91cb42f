//! Error types for the device module.

use thiserror::Error;

/// An error reported by the device-control library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct DriverError {
    /// Library status code.
    pub code: i32,

    /// Human readable description.
    pub message: String,
}

impl DriverError {
    /// Generic failure.
    pub const ERROR: i32 = -1;

    /// The requested port does not exist.
    pub const UNKNOWN_PORT: i32 = -5;

    /// The model is not in the abilities list.
    pub const MODEL_NOT_FOUND: i32 = -105;

    /// Create a new driver error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Step of the open sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Lookup,
    HandleCreate,
    AbilitiesBind,
    PortBind,
    Init,
}

impl std::fmt::Display for InitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            Self::Lookup => "model lookup",
            Self::HandleCreate => "handle creation",
            Self::AbilitiesBind => "abilities binding",
            Self::PortBind => "port binding",
            Self::Init => "initialization",
        };
        f.write_str(stage)
    }
}

/// Errors that can occur during device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No enumerated device has the requested name.
    #[error("Camera not found: {0}")]
    DeviceNotFound(String),

    /// Device enumeration failed.
    #[error("Failed to enumerate cameras: {0}")]
    EnumerationFailed(#[source] DriverError),

    /// One step of the open sequence failed.
    #[error("Failed to open {name}: {stage} failed: {source}")]
    InitFailed {
        stage: InitStage,
        name: String,
        #[source]
        source: DriverError,
    },

    /// The device did not produce an image.
    #[error("Capture failed on {name}: {source}")]
    CaptureFailed {
        name: String,
        #[source]
        source: DriverError,
    },

    /// A captured file could not be read off the device.
    #[error("File transfer failed on {name}: {source}")]
    TransferFailed {
        name: String,
        #[source]
        source: DriverError,
    },

    /// Image data could not be decoded.
    #[error("Image decode failed: {0}")]
    DecodeFailed(String),

    /// The device refused a configuration value, or it could not be encoded.
    #[error("Configuration {key} rejected: {reason}")]
    ConfigRejected { key: String, reason: String },

    /// The configuration key is unknown or carries no value.
    #[error("Configuration {0} not supported by this camera")]
    Unsupported(String),

    /// The operation needs an open session.
    #[error("Cannot {0}: no camera is open")]
    InvalidState(&'static str),
}

impl DeviceError {
    /// Whether the session stays usable after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::DeviceNotFound(_) | Self::EnumerationFailed(_) | Self::InitFailed { .. }
        )
    }
}
