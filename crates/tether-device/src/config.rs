//! Conversion between configuration widgets and property values.

use tether_ipc::{PropertyDescriptor, PropertyKind, PropertyValue};

use crate::driver::{ConfigWidget, WidgetKind, WidgetValue};
use crate::error::DeviceError;
use crate::DeviceResult;

/// Describe a widget as a typed property.
pub(crate) fn describe(key: &str, widget: &ConfigWidget) -> DeviceResult<PropertyDescriptor> {
    let (kind, current) = match (&widget.kind, &widget.value) {
        (WidgetKind::Text, WidgetValue::Text(text)) => {
            (PropertyKind::Text, PropertyValue::Text(text.clone()))
        }
        (WidgetKind::Range { min, max, step }, WidgetValue::Float(value)) => (
            PropertyKind::Range {
                min: *min,
                max: *max,
                step: *step,
            },
            PropertyValue::Number(f64::from(*value)),
        ),
        (WidgetKind::Toggle, WidgetValue::Int(value)) => {
            (PropertyKind::Toggle, PropertyValue::Toggle(*value != 0))
        }
        (WidgetKind::Radio(choices) | WidgetKind::Menu(choices), WidgetValue::Text(text)) => (
            PropertyKind::Choice(choices.clone()),
            PropertyValue::Text(text.clone()),
        ),
        _ => return Err(DeviceError::Unsupported(key.to_string())),
    };

    Ok(PropertyDescriptor { kind, current })
}

/// Encode a property value for the given widget.
pub(crate) fn encode(
    key: &str,
    widget: &ConfigWidget,
    value: &PropertyValue,
) -> DeviceResult<WidgetValue> {
    let rejected = |reason: String| DeviceError::ConfigRejected {
        key: key.to_string(),
        reason,
    };

    match &widget.kind {
        WidgetKind::Text => Ok(WidgetValue::Text(value.to_text())),
        WidgetKind::Range { min, max, .. } => {
            let number = match value {
                PropertyValue::Number(n) => *n as f32,
                PropertyValue::Text(text) => text
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| rejected(format!("`{}` is not a number", text)))?,
                PropertyValue::Toggle(_) => {
                    return Err(rejected("expected a number".to_string()));
                }
            };
            if !(*min..=*max).contains(&number) {
                return Err(rejected(format!("{} outside {}..={}", number, min, max)));
            }
            Ok(WidgetValue::Float(number))
        }
        WidgetKind::Toggle => match value {
            PropertyValue::Toggle(on) => Ok(WidgetValue::Int(i32::from(*on))),
            PropertyValue::Number(n) => Ok(WidgetValue::Int(i32::from(*n != 0.0))),
            PropertyValue::Text(text) => match text.as_str() {
                "true" | "1" => Ok(WidgetValue::Int(1)),
                "false" | "0" => Ok(WidgetValue::Int(0)),
                other => Err(rejected(format!("`{}` is not a toggle value", other))),
            },
        },
        WidgetKind::Radio(choices) | WidgetKind::Menu(choices) => {
            let text = value.to_text();
            if choices.iter().any(|choice| *choice == text) {
                Ok(WidgetValue::Text(text))
            } else {
                Err(rejected(format!("`{}` is not one of the choices", text)))
            }
        }
        _ => Err(DeviceError::Unsupported(key.to_string())),
    }
}
