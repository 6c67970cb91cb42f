//! Events sent from a source to the host.

use serde::{Deserialize, Serialize};

use crate::state::SourceState;

/// Events that a source can send to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceEvent {
    /// Source state has changed.
    StateChanged {
        /// Previous state.
        previous: SourceState,

        /// Current state.
        current: SourceState,
    },

    /// The property sheet is stale and should be rebuilt.
    PropertiesChanged,

    /// A device operation failed.
    Error {
        /// Whether the source keeps running.
        recoverable: bool,

        /// Error message.
        message: String,
    },
}
