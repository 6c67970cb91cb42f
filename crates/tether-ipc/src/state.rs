//! Source state machine types.

use serde::{Deserialize, Serialize};

/// Session state of a camera source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    /// No device handle is held.
    #[default]
    Closed,

    /// A device handle is open.
    Open {
        /// Name of the open camera.
        camera: String,
    },
}

impl SourceState {
    /// Returns true if a device is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns true if no device is open.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the open camera name, if any.
    pub fn camera(&self) -> Option<&str> {
        match self {
            Self::Open { camera } => Some(camera),
            Self::Closed => None,
        }
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Open { .. } => "Open",
        }
    }
}
