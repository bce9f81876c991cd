use derive_more::From;
use serde::{Deserialize, Serialize};

/// Declared data type of a feature or property.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigurationType {
    /// `true` / `false` values.
    Boolean,
    /// Numeric values. This is the type assumed when the payload omits it.
    #[default]
    Numeric,
    /// String values. See [`ValueFormat`] for how the string is interpreted.
    String,
}

/// Format of a [`ConfigurationType::String`] value.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueFormat {
    /// Plain text.
    #[default]
    Text,
    /// Arbitrary JSON document.
    Json,
    /// YAML document, delivered as a string.
    Yaml,
}

/// A typed value of a feature or property.
///
/// Unlike the raw payload, `Value` is always consistent with the declared [`ConfigurationType`]
/// of the feature or property it belongs to.
#[derive(Debug, Serialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum Value {
    /// A boolean value.
    Boolean(bool),
    /// A numeric value.
    Numeric(f64),
    /// A text or YAML string.
    String(String),
    /// A JSON document of a `STRING` typed value with `JSON` format.
    Json(serde_json::Value),
}

impl Value {
    /// Convert a raw JSON value into a typed `Value`. Returns `None` if `raw` does not conform to
    /// `value_type`.
    pub(crate) fn from_json(
        raw: &serde_json::Value,
        value_type: ConfigurationType,
        format: ValueFormat,
    ) -> Option<Value> {
        match (value_type, raw) {
            (ConfigurationType::Boolean, serde_json::Value::Bool(b)) => Some(Value::Boolean(*b)),
            (ConfigurationType::Numeric, serde_json::Value::Number(n)) => {
                n.as_f64().map(Value::Numeric)
            }
            (ConfigurationType::String, value) if format == ValueFormat::Json => {
                Some(Value::Json(value.clone()))
            }
            (ConfigurationType::String, serde_json::Value::String(s)) => {
                Some(Value::String(s.clone()))
            }
            _ => None,
        }
    }

    /// The configuration type this value belongs to.
    pub fn value_type(&self) -> ConfigurationType {
        match self {
            Value::Boolean(_) => ConfigurationType::Boolean,
            Value::Numeric(_) => ConfigurationType::Numeric,
            Value::String(_) | Value::Json(_) => ConfigurationType::String,
        }
    }

    /// Returns the boolean, if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number, if this is a numeric value.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string, if this is a text or YAML value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the JSON document, if this is a JSON value.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}
