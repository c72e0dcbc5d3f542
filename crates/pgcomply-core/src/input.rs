//! Input declarations and resolved input values
//!
//! Controls declare the configuration inputs they depend on by name; the
//! catalog declares each name once with a type and optional default. The
//! Input Resolver (pgcomply-runner) turns declarations plus profile data
//! into shared, immutable `InputValue`s.

use serde::{Deserialize, Serialize};

/// Declared type of a configuration input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    String,
    Integer,
    Boolean,
    StringList,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::String => "string",
            InputType::Integer => "integer",
            InputType::Boolean => "boolean",
            InputType::StringList => "string_list",
        }
    }
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declaration of a named configuration input in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    /// Input name, shared across every control that declares it
    pub name: String,

    /// Declared type; provided values are coerced to this
    #[serde(rename = "type", default)]
    pub input_type: InputType,

    /// Default used when no profile/override supplies a value
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,

    #[serde(default)]
    pub description: Option<String>,
}

/// A resolved configuration value, immutable for the rest of the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Str(String),
    Int(i64),
    Bool(bool),
    StrList(Vec<String>),
}

impl InputValue {
    /// Coerce a raw YAML value (profile file or catalog default) to the
    /// declared type. Returns None when the value cannot be represented.
    pub fn coerce_yaml(raw: &serde_yaml::Value, ty: InputType) -> Option<Self> {
        use serde_yaml::Value;
        match ty {
            InputType::String => match raw {
                Value::String(s) => Some(InputValue::Str(s.clone())),
                Value::Number(n) => Some(InputValue::Str(n.to_string())),
                Value::Bool(b) => Some(InputValue::Str(b.to_string())),
                _ => None,
            },
            InputType::Integer => match raw {
                Value::Number(n) => n.as_i64().map(InputValue::Int),
                Value::String(s) => s.trim().parse().ok().map(InputValue::Int),
                _ => None,
            },
            InputType::Boolean => match raw {
                Value::Bool(b) => Some(InputValue::Bool(*b)),
                Value::String(s) => match s.to_lowercase().as_str() {
                    "true" | "on" | "yes" => Some(InputValue::Bool(true)),
                    "false" | "off" | "no" => Some(InputValue::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            InputType::StringList => match raw {
                Value::Sequence(seq) => {
                    let mut out = Vec::with_capacity(seq.len());
                    for item in seq {
                        match item {
                            Value::String(s) => out.push(s.clone()),
                            Value::Number(n) => out.push(n.to_string()),
                            _ => return None,
                        }
                    }
                    Some(InputValue::StrList(out))
                }
                // A bare string is accepted as a one-element list
                Value::String(s) => Some(InputValue::StrList(vec![s.clone()])),
                _ => None,
            },
        }
    }

    /// Coerce a raw string (environment variable or `--set name=value`) to
    /// the declared type. Lists are comma-separated.
    pub fn coerce_str(raw: &str, ty: InputType) -> Option<Self> {
        match ty {
            InputType::String => Some(InputValue::Str(raw.to_string())),
            InputType::Integer => raw.trim().parse().ok().map(InputValue::Int),
            InputType::Boolean => match raw.to_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Some(InputValue::Bool(true)),
                "false" | "off" | "no" | "0" => Some(InputValue::Bool(false)),
                _ => None,
            },
            InputType::StringList => Some(InputValue::StrList(
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )),
        }
    }

    /// Render for report output and log messages
    pub fn render(&self) -> String {
        match self {
            InputValue::Str(s) => s.clone(),
            InputValue::Int(i) => i.to_string(),
            InputValue::Bool(b) => b.to_string(),
            InputValue::StrList(items) => items.join(", "),
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            InputValue::StrList(items) => Some(items),
            _ => None,
        }
    }
}

impl std::fmt::Display for InputValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_yaml_integer_from_string() {
        let raw = serde_yaml::Value::String("100".into());
        assert_eq!(
            InputValue::coerce_yaml(&raw, InputType::Integer),
            Some(InputValue::Int(100))
        );
    }

    #[test]
    fn test_coerce_yaml_rejects_mismatch() {
        let raw = serde_yaml::Value::String("not-a-number".into());
        assert_eq!(InputValue::coerce_yaml(&raw, InputType::Integer), None);

        let raw = serde_yaml::Value::Bool(true);
        assert_eq!(InputValue::coerce_yaml(&raw, InputType::StringList), None);
    }

    #[test]
    fn test_coerce_str_list() {
        assert_eq!(
            InputValue::coerce_str("postgres, replicator", InputType::StringList),
            Some(InputValue::StrList(vec![
                "postgres".into(),
                "replicator".into()
            ]))
        );
    }

    #[test]
    fn test_string_zero_and_integer_zero_are_distinct() {
        let s = InputValue::Str("0".into());
        let i = InputValue::Int(0);
        assert_ne!(s, i);
    }

    #[test]
    fn test_spec_parses_with_default_type() {
        let spec: InputSpec = serde_yaml::from_str("name: pg_owner").unwrap();
        assert_eq!(spec.input_type, InputType::String);
        assert!(spec.default.is_none());
    }
}
