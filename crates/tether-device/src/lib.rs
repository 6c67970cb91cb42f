//! Tethered camera device sessions.
//!
//! This crate wraps a device-control library behind the [`CameraDriver`] and
//! [`CameraHandle`] traits and provides a serialized [`DeviceSession`] for
//! opening a camera by name, capturing preview frames and photos, and
//! reading or writing single configuration values.

mod config;
mod context;
mod decode;
mod driver;
mod error;
mod frame;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod session;

pub use context::DeviceContext;
pub use decode::{DecodedImage, ImageCrateDecoder, ImageDecoder};
pub use driver::{
    CameraDriver, CameraEvent, CameraFilePath, CameraHandle, ConfigWidget, ModelAbilities,
    PortInfo, WidgetKind, WidgetValue,
};
pub use error::{DeviceError, DriverError, InitStage};
pub use frame::{CaptureTimestamp, FrameBuffer, FrameDimensions, VideoFrame};
pub use session::{CaptureKind, DeviceSession};

/// Configuration key of the autofocus drive toggle.
pub const AUTOFOCUS_DRIVE: &str = "autofocusdrive";

/// Configuration key that aborts a running autofocus.
pub const CANCEL_AUTOFOCUS: &str = "cancelautofocus";

/// Configuration key of the manual focus drive.
pub const MANUAL_FOCUS_DRIVE: &str = "manualfocusdrive";

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Result type for device-control library calls.
pub type DriverResult<T> = Result<T, DriverError>;
