// ── Sensor domain types ──

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A parsed sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("on"),
            Self::Bool(false) => f.write_str("off"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Value shape and validation rules of a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorKind {
    Text {
        /// Restricts values to a fixed set (makes the sensor an enum).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        /// Integers are rendered without a fractional part unless set.
        #[serde(default)]
        float: bool,
    },
    Binary {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload_on: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload_off: Option<String>,
    },
}

impl SensorKind {
    pub fn text() -> Self {
        Self::Text {
            options: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn number() -> Self {
        Self::Number {
            min: None,
            max: None,
            float: false,
        }
    }

    pub fn binary() -> Self {
        Self::Binary {
            payload_on: None,
            payload_off: None,
        }
    }

    /// Parse one raw output token. Unparseable input yields `None`.
    pub fn parse(&self, raw: &str) -> Option<SensorValue> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            Self::Text { .. } => Some(SensorValue::Text(raw.to_owned())),
            Self::Number { .. } => raw
                .trim_end_matches('%')
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(SensorValue::Number),
            Self::Binary {
                payload_on,
                payload_off,
            } => parse_binary(raw, payload_on.as_deref(), payload_off.as_deref())
                .map(SensorValue::Bool),
        }
    }

    /// Validate a value before writing it to the device.
    ///
    /// Returns the typed value to store locally and the string form that
    /// is substituted into the write command.
    pub fn validate(&self, value: &SensorValue) -> Result<(SensorValue, String), CoreError> {
        match (self, value) {
            (
                Self::Text {
                    options,
                    min_length,
                    max_length,
                },
                value,
            ) => {
                let text = value.to_string();
                if let Some(options) = options {
                    if !options.iter().any(|o| *o == text) {
                        return Err(CoreError::validation(format!(
                            "'{text}' is not one of: {}",
                            options.join(", ")
                        )));
                    }
                }
                let len = text.chars().count();
                if min_length.is_some_and(|min| len < min) || max_length.is_some_and(|max| len > max)
                {
                    return Err(CoreError::validation(format!(
                        "length {len} of '{text}' is out of range"
                    )));
                }
                Ok((SensorValue::Text(text.clone()), text))
            }
            (Self::Number { min, max, float }, value) => {
                let n = match value {
                    SensorValue::Number(n) => *n,
                    SensorValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                        CoreError::validation(format!("'{s}' is not a number"))
                    })?,
                    SensorValue::Bool(_) => {
                        return Err(CoreError::validation("expected a number, got a boolean"));
                    }
                };
                if !n.is_finite() {
                    return Err(CoreError::validation("number must be finite"));
                }
                if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                    return Err(CoreError::validation(format!(
                        "{n} is outside [{}, {}]",
                        min.map_or_else(|| "-inf".into(), |m| m.to_string()),
                        max.map_or_else(|| "inf".into(), |m| m.to_string()),
                    )));
                }
                let rendered = if *float || n.fract() != 0.0 {
                    n.to_string()
                } else {
                    format!("{n:.0}")
                };
                Ok((SensorValue::Number(n), rendered))
            }
            (
                Self::Binary {
                    payload_on,
                    payload_off,
                },
                value,
            ) => {
                let on = match value {
                    SensorValue::Bool(b) => *b,
                    SensorValue::Text(s) => {
                        parse_binary(s, payload_on.as_deref(), payload_off.as_deref())
                            .ok_or_else(|| CoreError::validation(format!("'{s}' is not on/off")))?
                    }
                    SensorValue::Number(_) => {
                        return Err(CoreError::validation("expected on/off, got a number"));
                    }
                };
                let rendered = if on {
                    payload_on.clone().unwrap_or_else(|| "on".into())
                } else {
                    payload_off.clone().unwrap_or_else(|| "off".into())
                };
                Ok((SensorValue::Bool(on), rendered))
            }
        }
    }
}

fn parse_binary(raw: &str, payload_on: Option<&str>, payload_off: Option<&str>) -> Option<bool> {
    let raw = raw.trim();
    if payload_on.is_some_and(|p| p.eq_ignore_ascii_case(raw)) {
        return Some(true);
    }
    if payload_off.is_some_and(|p| p.eq_ignore_ascii_case(raw)) {
        return Some(false);
    }
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Declarative description of a sensor fed by a [`SensorCommand`](super::SensorCommand).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSpec {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: SensorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Children are discovered from command output at runtime.
    #[serde(default)]
    pub dynamic: bool,
    /// Splits `child_id value` lines of a dynamic sensor. Whitespace if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// Write template, rendered with `value` (and `id` for children).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_command: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl SensorSpec {
    pub fn new(key: impl Into<String>, kind: SensorKind) -> Self {
        Self {
            key: key.into(),
            name: None,
            kind,
            unit: None,
            dynamic: false,
            separator: None,
            set_command: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_set_command(mut self, template: impl Into<String>) -> Self {
        self.set_command = Some(template.into());
        self
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| super::command::humanize(&self.key))
    }
}

/// Runtime state of one sensor (static, dynamic parent, or child).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensor {
    pub key: String,
    pub name: String,
    pub value: Option<SensorValue>,
    /// Last non-empty value, kept across failed or empty reads.
    pub last_known_value: Option<SensorValue>,
    pub unit: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub is_dynamic: bool,
    /// Child keys in reported order. `None` for non-dynamic sensors.
    pub children: Option<Vec<String>>,
    /// Parent key for dynamic children.
    pub parent: Option<String>,
}

impl Sensor {
    pub fn from_spec(spec: &SensorSpec) -> Self {
        Self {
            key: spec.key.clone(),
            name: spec.display_name(),
            value: None,
            last_known_value: None,
            unit: spec.unit.clone(),
            attributes: spec.attributes.clone(),
            is_dynamic: spec.dynamic,
            children: spec.dynamic.then(Vec::new),
            parent: None,
        }
    }

    pub fn child_of(parent: &SensorSpec, key: String, raw_id: &str) -> Self {
        let mut attributes = parent.attributes.clone();
        attributes.insert("id".into(), raw_id.to_owned());
        Self {
            key,
            name: format!("{} {raw_id}", parent.display_name()),
            value: None,
            last_known_value: None,
            unit: parent.unit.clone(),
            attributes,
            is_dynamic: false,
            children: None,
            parent: Some(parent.key.clone()),
        }
    }

    pub(crate) fn set_value(&mut self, value: Option<SensorValue>) {
        if value.is_some() {
            self.last_known_value.clone_from(&value);
        }
        self.value = value;
    }
}
