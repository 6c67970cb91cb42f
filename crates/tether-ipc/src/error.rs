//! Error types for host settings parsing.

use thiserror::Error;

/// Errors produced while turning host settings into typed values.
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    /// The settings object carries no `changed` tag.
    #[error("Settings carry no `changed` tag")]
    MissingChangedTag,

    /// The `changed` tag names a field this source does not know.
    #[error("Unknown changed field: {0}")]
    UnknownField(String),

    /// A required key is missing.
    #[error("Missing settings key: {0}")]
    MissingKey(String),

    /// A key is present but holds a value of the wrong shape.
    #[error("Invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    /// The settings object could not be deserialized.
    #[error("Malformed settings: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
