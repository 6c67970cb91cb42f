//! Update commands sent from the host to a source.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SettingsError;
use crate::types::{ManualFocus, PropertyValue};
use crate::SettingsResult;

/// One logical settings change.
///
/// The host surfaces exactly one changed field per update callback; each
/// variant carries the new value of that field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceCommand {
    /// A different camera was selected.
    CameraChanged(String),

    /// Preview frame rate changed.
    FpsChanged(u32),

    /// Timelapse interval (seconds) changed.
    IntervalChanged(u32),

    /// Autofocus drive toggled.
    AutofocusChanged(bool),

    /// Manual focus drive requested.
    ManualFocusChanged(ManualFocus),

    /// A device property was edited.
    PropertyChanged { key: String, value: PropertyValue },
}

impl SourceCommand {
    /// Build a command from the host's settings object.
    ///
    /// The host marks the touched field with a `changed` tag; for device
    /// properties (`auto_prop`) the property key is stored under `auto_prop`
    /// and its value under the key itself.
    pub fn from_settings(settings: &Value) -> SettingsResult<Self> {
        let changed = settings
            .get("changed")
            .and_then(Value::as_str)
            .ok_or(SettingsError::MissingChangedTag)?;

        match changed {
            "camera" => Ok(Self::CameraChanged(
                string_field(settings, "camera_name")?.to_string(),
            )),
            "fps" => Ok(Self::FpsChanged(u32_field(settings, "fps")?)),
            "interval" => Ok(Self::IntervalChanged(u32_field(settings, "interval")?)),
            "autofocus" => Ok(Self::AutofocusChanged(bool_field(
                settings,
                "autofocusdrive",
            )?)),
            "manualfocus" => {
                let (key, value) = ["manualfocusdrive", "manualfocus"]
                    .into_iter()
                    .find_map(|key| settings.get(key).map(|value| (key, value)))
                    .ok_or_else(|| SettingsError::MissingKey("manualfocusdrive".to_string()))?;
                Ok(Self::ManualFocusChanged(ManualFocus::from_json(key, value)?))
            }
            "auto_prop" => {
                let key = string_field(settings, "auto_prop")?;
                let raw = settings
                    .get(key)
                    .ok_or_else(|| SettingsError::MissingKey(key.to_string()))?;
                let value =
                    PropertyValue::from_json(raw).ok_or_else(|| SettingsError::InvalidValue {
                        key: key.to_string(),
                        reason: format!("unsupported property value {raw}"),
                    })?;
                Ok(Self::PropertyChanged {
                    key: key.to_string(),
                    value,
                })
            }
            other => Err(SettingsError::UnknownField(other.to_string())),
        }
    }

    /// Returns the name of the changed field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::CameraChanged(_) => "camera",
            Self::FpsChanged(_) => "fps",
            Self::IntervalChanged(_) => "interval",
            Self::AutofocusChanged(_) => "autofocus",
            Self::ManualFocusChanged(_) => "manualfocus",
            Self::PropertyChanged { .. } => "auto_prop",
        }
    }
}

fn string_field<'a>(settings: &'a Value, key: &str) -> SettingsResult<&'a str> {
    let value = settings
        .get(key)
        .ok_or_else(|| SettingsError::MissingKey(key.to_string()))?;
    value.as_str().ok_or_else(|| SettingsError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected string, got {value}"),
    })
}

fn u32_field(settings: &Value, key: &str) -> SettingsResult<u32> {
    let value = settings
        .get(key)
        .ok_or_else(|| SettingsError::MissingKey(key.to_string()))?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SettingsError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected non-negative integer, got {value}"),
        })
}

fn bool_field(settings: &Value, key: &str) -> SettingsResult<bool> {
    let value = settings
        .get(key)
        .ok_or_else(|| SettingsError::MissingKey(key.to_string()))?;
    value.as_bool().ok_or_else(|| SettingsError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected bool, got {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FocusStep;
    use serde_json::json;

    #[test]
    fn test_each_tag_maps_to_one_command() {
        let base = json!({
            "camera_name": "Canon EOS 80D",
            "fps": 60,
            "interval": 5,
            "autofocusdrive": true,
            "manualfocusdrive": "Near 1",
            "auto_prop": "iso",
            "iso": "800",
        });

        let cases = [
            ("camera", SourceCommand::CameraChanged("Canon EOS 80D".into())),
            ("fps", SourceCommand::FpsChanged(60)),
            ("interval", SourceCommand::IntervalChanged(5)),
            ("autofocus", SourceCommand::AutofocusChanged(true)),
            (
                "manualfocus",
                SourceCommand::ManualFocusChanged(ManualFocus::Step(FocusStep::Near1)),
            ),
            (
                "auto_prop",
                SourceCommand::PropertyChanged {
                    key: "iso".into(),
                    value: PropertyValue::Text("800".into()),
                },
            ),
        ];

        for (tag, expected) in cases {
            let mut settings = base.clone();
            settings["changed"] = json!(tag);
            let command = SourceCommand::from_settings(&settings).unwrap();
            assert_eq!(command.field(), tag);
            assert_eq!(command, expected);
        }
    }

    #[test]
    fn test_missing_and_unknown_tags() {
        assert_eq!(
            SourceCommand::from_settings(&json!({"fps": 30})),
            Err(SettingsError::MissingChangedTag)
        );
        assert_eq!(
            SourceCommand::from_settings(&json!({"changed": "zoom"})),
            Err(SettingsError::UnknownField("zoom".into()))
        );
    }

    #[test]
    fn test_range_property_value() {
        let settings = json!({
            "changed": "auto_prop",
            "auto_prop": "manualfocusdrive",
            "manualfocusdrive": 42.0,
        });

        assert_eq!(
            SourceCommand::from_settings(&settings).unwrap(),
            SourceCommand::PropertyChanged {
                key: "manualfocusdrive".into(),
                value: PropertyValue::Number(42.0),
            }
        );
    }

    #[test]
    fn test_negative_interval_rejected() {
        let settings = json!({"changed": "interval", "interval": -3});
        assert!(matches!(
            SourceCommand::from_settings(&settings),
            Err(SettingsError::InvalidValue { .. })
        ));
    }
}
