/*
 * This file is part of iito.
 *
 * Copyright (C) 2025 iito contributors
 *
 * iito is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * iito is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with iito. If not, see <https://www.gnu.org/licenses/>.
 */

//! Target states parsed from rule payloads
//!
//! Payloads are opaque to the engine; each driver parses them once at probe
//! time into a [`TargetState`] kept alongside the rule.

use serde_json::{Map, Value};

use crate::error::{IitoError, Result};

pub const TRIGGER: &str = "trigger";
pub const BRIGHTNESS: &str = "brightness";

/// Trigger written when a state does not name one
pub const DEFAULT_TRIGGER: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brightness {
    /// Whatever the device currently reports as `max_brightness`
    Max,
    Level(i64),
}

impl Brightness {
    pub fn resolve(self, max_brightness: i64) -> i64 {
        match self {
            Brightness::Max => max_brightness,
            Brightness::Level(level) => level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetState {
    pub trigger: String,
    pub brightness: Brightness,
    /// Trigger-specific attributes in payload order, already rendered as text
    pub attributes: Vec<(String, String)>,
}

impl TargetState {
    /// The state applied when no rule matches
    pub fn off() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER.to_string(),
            brightness: Brightness::Level(0),
            attributes: Vec::new(),
        }
    }

    /// Parse a payload. Keys other than `trigger` and `brightness` are kept
    /// as attributes when `extra` is set and rejected otherwise.
    pub fn parse(output: &str, payload: &Map<String, Value>, extra: bool) -> Result<Self> {
        let trigger = match payload.get(TRIGGER) {
            None => DEFAULT_TRIGGER.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(IitoError::invalid_state(
                    output,
                    format!("trigger must be a string, got {}", other),
                ))
            }
        };

        let brightness = match payload.get(BRIGHTNESS) {
            None => Brightness::Max,
            Some(Value::Bool(true)) => Brightness::Max,
            Some(Value::Bool(false)) => Brightness::Level(0),
            Some(v) => v.as_i64().map(Brightness::Level).ok_or_else(|| {
                IitoError::invalid_state(
                    output,
                    format!("brightness must be a boolean or an integer, got {}", v),
                )
            })?,
        };

        let mut attributes = Vec::new();
        for (key, value) in payload {
            if key == TRIGGER || key == BRIGHTNESS {
                continue;
            }
            if !extra {
                return Err(IitoError::invalid_state(
                    output,
                    format!("unsupported attribute \"{}\"", key),
                ));
            }
            attributes.push((key.clone(), attribute_text(output, key, value)?));
        }

        Ok(Self {
            trigger,
            brightness,
            attributes,
        })
    }
}

/// Render an attribute value as the text written to sysfs
pub fn attribute_text(output: &str, key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Null => Ok(String::new()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(IitoError::invalid_state(
            output,
            format!("unsupported value for \"{}\": {}", key, other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults() {
        let state = TargetState::parse("led0", &payload(json!({})), true).unwrap();
        assert_eq!(state.trigger, "none");
        assert_eq!(state.brightness, Brightness::Max);
        assert!(state.attributes.is_empty());
    }

    #[test]
    fn test_brightness_forms() {
        let on = TargetState::parse("led0", &payload(json!({ "brightness": true })), false).unwrap();
        assert_eq!(on.brightness.resolve(255), 255);

        let off = TargetState::parse("led0", &payload(json!({ "brightness": false })), false).unwrap();
        assert_eq!(off.brightness.resolve(255), 0);

        let level = TargetState::parse("led0", &payload(json!({ "brightness": 7 })), false).unwrap();
        assert_eq!(level.brightness.resolve(255), 7);

        assert!(TargetState::parse("led0", &payload(json!({ "brightness": "max" })), false).is_err());
    }

    #[test]
    fn test_off_state() {
        let off = TargetState::off();
        assert_eq!(off.trigger, "none");
        assert_eq!(off.brightness.resolve(255), 0);
    }

    #[test]
    fn test_attributes_keep_payload_order() {
        let state = TargetState::parse(
            "led0",
            &payload(json!({
                "trigger": "timer",
                "delay_on": 100,
                "delay_off": "900",
                "invert": true,
                "shot": false,
                "device_name": null
            })),
            true,
        )
        .unwrap();

        assert_eq!(state.trigger, "timer");
        assert_eq!(
            state.attributes,
            vec![
                ("delay_on".to_string(), "100".to_string()),
                ("delay_off".to_string(), "900".to_string()),
                ("invert".to_string(), "1".to_string()),
                ("shot".to_string(), "0".to_string()),
                ("device_name".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_unsupported_values() {
        for bad in [json!({ "delay_on": 1.5 }), json!({ "delay_on": [1] }), json!({ "delay_on": {} })] {
            let err = TargetState::parse("led0", &payload(bad), true).unwrap_err();
            assert!(matches!(err, IitoError::InvalidState { .. }));
        }
        assert!(TargetState::parse("led0", &payload(json!({ "trigger": 1 })), true).is_err());
    }

    #[test]
    fn test_extra_keys_rejected_without_attributes() {
        let err = TargetState::parse("led0", &payload(json!({ "delay_on": 100 })), false).unwrap_err();
        assert!(matches!(err, IitoError::InvalidState { .. }));
    }
}
