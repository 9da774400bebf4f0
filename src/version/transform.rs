//! Value transforms applied by field mappings

use serde_json::{Number, Value};
use thiserror::Error;

/// Errors raised while applying field mappings to a payload
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("required field {0} is missing")]
    MissingField(String),

    #[error("failed to transform field {field}: cannot convert {value} to {target}")]
    Conversion {
        field: String,
        value: Value,
        target: &'static str,
    },

    #[error("failed to convert input to a field map: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A named transform hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    String,
    Int,
    Float,
    Bool,
    Lowercase,
    Uppercase,
}

impl Transform {
    /// Unknown hooks map to `None` and leave values untouched
    pub fn from_hook(hook: &str) -> Option<Self> {
        match hook {
            "string" => Some(Transform::String),
            "int" => Some(Transform::Int),
            "float" => Some(Transform::Float),
            "bool" => Some(Transform::Bool),
            "lowercase" => Some(Transform::Lowercase),
            "uppercase" => Some(Transform::Uppercase),
            _ => None,
        }
    }

    fn target(&self) -> &'static str {
        match self {
            Transform::String => "string",
            Transform::Int => "int",
            Transform::Float => "float",
            Transform::Bool => "bool",
            Transform::Lowercase => "lowercase",
            Transform::Uppercase => "uppercase",
        }
    }

    pub fn apply(&self, field: &str, value: Value) -> Result<Value, TransformError> {
        let converted = match (self, &value) {
            (Transform::String, Value::String(_)) => Some(value.clone()),
            (Transform::String, other) => Some(Value::String(other.to_string())),

            (Transform::Int, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .map(Value::from),
            (Transform::Int, Value::String(s)) => parse_int(s.trim()).map(Value::from),
            (Transform::Int, Value::Bool(b)) => Some(Value::from(i64::from(*b))),

            (Transform::Float, Value::Number(n)) => n.as_f64().and_then(float_value),
            (Transform::Float, Value::String(s)) => {
                s.trim().parse::<f64>().ok().and_then(float_value)
            }
            (Transform::Float, Value::Bool(b)) => float_value(if *b { 1.0 } else { 0.0 }),

            (Transform::Bool, Value::Bool(_)) => Some(value.clone()),
            (Transform::Bool, Value::Number(n)) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
            (Transform::Bool, Value::String(s)) => parse_bool(s.trim()).map(Value::Bool),

            (Transform::Lowercase, Value::String(s)) => Some(Value::String(s.to_lowercase())),
            (Transform::Uppercase, Value::String(s)) => Some(Value::String(s.to_uppercase())),
            (Transform::Lowercase | Transform::Uppercase, _) => Some(value.clone()),

            _ => None,
        };

        converted.ok_or_else(|| TransformError::Conversion {
            field: field.to_string(),
            value,
            target: self.target(),
        })
    }
}

/// Apply the hook named by `hook` to a field value
pub fn apply_transform(field: &str, value: Value, hook: Option<&str>) -> Result<Value, TransformError> {
    match hook.and_then(Transform::from_hook) {
        Some(transform) => transform.apply(field, value),
        None => Ok(value),
    }
}

fn parse_int(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn float_value(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("string", json!(123), json!("123"))]
    #[case("string", json!("abc"), json!("abc"))]
    #[case("string", json!(true), json!("true"))]
    #[case("int", json!("42"), json!(42))]
    #[case("int", json!(" 7 "), json!(7))]
    #[case("int", json!(3.9), json!(3))]
    #[case("int", json!(true), json!(1))]
    #[case("float", json!("1.5"), json!(1.5))]
    #[case("float", json!(2), json!(2.0))]
    #[case("bool", json!("TRUE"), json!(true))]
    #[case("bool", json!(0), json!(false))]
    #[case("lowercase", json!("MiXeD"), json!("mixed"))]
    #[case("uppercase", json!("MiXeD"), json!("MIXED"))]
    #[case("uppercase", json!(5), json!(5))]
    #[case("reverse", json!("unchanged"), json!("unchanged"))]
    fn applies_named_hook(#[case] hook: &str, #[case] input: Value, #[case] expected: Value) {
        let result = apply_transform("field", input, Some(hook)).unwrap();

        assert_eq!(result, expected);
    }

    #[test]
    fn no_hook_passes_value_through() {
        let value = json!({"nested": [1, 2]});

        assert_eq!(apply_transform("field", value.clone(), None).unwrap(), value);
    }

    #[rstest]
    #[case("int", json!("abc"))]
    #[case("float", json!([1]))]
    #[case("bool", json!("maybe"))]
    fn reports_failed_conversion(#[case] hook: &str, #[case] input: Value) {
        let err = apply_transform("age", input, Some(hook)).unwrap_err();

        assert!(err.to_string().starts_with("failed to transform field age"));
    }
}
