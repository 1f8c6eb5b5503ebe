//! Closed value model for parameter slots.
//!
//! Every slot carries a [`ValueType`] and every value it holds is a
//! [`ParamValue`] of the same shape. Text from the document is converted
//! with [`ValueType::parse_text`]; values coming from the structured editor
//! are checked with [`ParamValue::conform_to`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int,
    Real,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Scalar(ScalarKind),
    Array(ScalarKind),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Real(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(Scalar),
    Array(Vec<Scalar>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("expected {expected}, found '{found}'")]
    Invalid { expected: ValueType, found: String },

    #[error("expected {expected}, found {found}")]
    Mismatch { expected: ValueType, found: String },

    #[error("'{0}' mixes quote characters and cannot be written back")]
    Unwritable(String),
}

impl ScalarKind {
    fn from_schema(name: &str) -> Self {
        match name.trim() {
            "Boolean" | "Bool" | "bool" => ScalarKind::Bool,
            "Integer" | "Int" | "int" => ScalarKind::Int,
            "Real" | "Float" | "Double" | "real" => ScalarKind::Real,
            _ => ScalarKind::String,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Bool => write!(f, "Bool"),
            ScalarKind::Int => write!(f, "Int"),
            ScalarKind::Real => write!(f, "Real"),
            ScalarKind::String => write!(f, "String"),
        }
    }
}

impl ValueType {
    pub const STRING: ValueType = ValueType::Scalar(ScalarKind::String);

    /// Map a schema type name (`Integer`, `Array:Real`, ...) to a value type.
    /// Unknown names are treated as strings.
    pub fn from_schema(name: &str) -> Self {
        match name.trim().strip_prefix("Array:") {
            Some(elem) => ValueType::Array(ScalarKind::from_schema(elem)),
            None => ValueType::Scalar(ScalarKind::from_schema(name)),
        }
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            ValueType::Scalar(kind) | ValueType::Array(kind) => *kind,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ValueType::Array(_))
    }

    /// Same shape with string elements
    pub fn relaxed(&self) -> Self {
        match self {
            ValueType::Scalar(_) => ValueType::Scalar(ScalarKind::String),
            ValueType::Array(_) => ValueType::Array(ScalarKind::String),
        }
    }

    /// Parse unquoted document text. Arrays split on whitespace.
    pub fn parse_text(&self, text: &str) -> Result<ParamValue, ValueError> {
        match self {
            ValueType::Scalar(ScalarKind::String) => {
                Ok(ParamValue::Scalar(Scalar::String(text.to_string())))
            }
            ValueType::Scalar(kind) => Scalar::parse(*kind, text.trim())
                .map(ParamValue::Scalar)
                .ok_or_else(|| ValueError::Invalid {
                    expected: *self,
                    found: text.to_string(),
                }),
            ValueType::Array(kind) => text
                .split_whitespace()
                .map(|item| {
                    Scalar::parse(*kind, item).ok_or_else(|| ValueError::Invalid {
                        expected: *self,
                        found: item.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ParamValue::Array),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Scalar(kind) => write!(f, "{}", kind),
            ValueType::Array(kind) => write!(f, "Array:{}", kind),
        }
    }
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Real(_) => ScalarKind::Real,
            Scalar::String(_) => ScalarKind::String,
        }
    }

    /// Parse a single token. Legacy boolean spellings normalize to true/false.
    pub fn parse(kind: ScalarKind, token: &str) -> Option<Scalar> {
        match kind {
            ScalarKind::Bool => match token.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Scalar::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Scalar::Bool(false)),
                _ => None,
            },
            ScalarKind::Int => token.parse().ok().map(Scalar::Int),
            ScalarKind::Real => token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Scalar::Real),
            ScalarKind::String => Some(Scalar::String(token.to_string())),
        }
    }

    fn is_array_element(&self) -> bool {
        match self {
            Scalar::String(s) => !s.is_empty() && !s.chars().any(char::is_whitespace),
            _ => true,
        }
    }

    fn conform_to(self, kind: ScalarKind) -> Option<Scalar> {
        match (self, kind) {
            (Scalar::Int(v), ScalarKind::Real) => Some(Scalar::Real(v as f64)),
            (scalar, kind) if scalar.kind() == kind => Some(scalar),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(true) => write!(f, "true"),
            Scalar::Bool(false) => write!(f, "false"),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Real(v) => {
                let magnitude = v.abs();
                if magnitude != 0.0 && !(1e-4..1e15).contains(&magnitude) {
                    write!(f, "{:e}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

impl ParamValue {
    /// Shape-check against a declared type, widening Int to Real. Array
    /// elements must each survive whitespace splitting.
    pub fn conform_to(self, expected: ValueType) -> Result<ParamValue, ValueError> {
        let found = self.describe();
        let mismatch = || ValueError::Mismatch { expected, found };

        match (self, expected) {
            (ParamValue::Scalar(scalar), ValueType::Scalar(kind)) => scalar
                .conform_to(kind)
                .map(ParamValue::Scalar)
                .ok_or_else(mismatch),
            (ParamValue::Array(items), ValueType::Array(kind)) => items
                .into_iter()
                .map(|item| item.conform_to(kind).filter(Scalar::is_array_element))
                .collect::<Option<Vec<_>>>()
                .map(ParamValue::Array)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        }
    }

    /// Reject text with no quoting form that reads back unchanged. A value
    /// holding `'` is double-quoted, which cannot carry `"`, newlines or escapes.
    pub fn check_writable(&self) -> Result<(), ValueError> {
        let text = self.to_text();
        let unwritable = text.contains('\'')
            && (text.contains('"') || text.contains('\n') || text.contains('\\'));
        if unwritable {
            Err(ValueError::Unwritable(text))
        } else {
            Ok(())
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ParamValue::Scalar(scalar) => Some(scalar),
            ParamValue::Array(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Text as written in the document, before quoting
    pub fn to_text(&self) -> String {
        match self {
            ParamValue::Scalar(scalar) => scalar.to_string(),
            ParamValue::Array(items) => items
                .iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn describe(&self) -> String {
        match self {
            ParamValue::Scalar(scalar) => scalar.kind().to_string(),
            ParamValue::Array(items) => match items.first() {
                Some(first) => format!("Array:{}", first.kind()),
                None => "Array".to_string(),
            },
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Scalar(Scalar::Real(value))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Scalar(Scalar::String(value))
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(values: Vec<i64>) -> Self {
        ParamValue::Array(values.into_iter().map(Scalar::Int).collect())
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(values: Vec<f64>) -> Self {
        ParamValue::Array(values.into_iter().map(Scalar::Real).collect())
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        ParamValue::Array(
            values
                .into_iter()
                .map(|v| Scalar::String(v.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_type_names() {
        assert_eq!(
            ValueType::from_schema("Integer"),
            ValueType::Scalar(ScalarKind::Int)
        );
        assert_eq!(
            ValueType::from_schema("Array:Real"),
            ValueType::Array(ScalarKind::Real)
        );
        assert_eq!(ValueType::from_schema("MooseEnum"), ValueType::STRING);
        assert_eq!(ValueType::Array(ScalarKind::Bool).to_string(), "Array:Bool");
    }

    #[test]
    fn test_legacy_booleans_normalize() {
        let ty = ValueType::Scalar(ScalarKind::Bool);
        assert_eq!(ty.parse_text("1").unwrap(), ParamValue::from(true));
        assert_eq!(ty.parse_text("0").unwrap(), ParamValue::from(false));
        assert_eq!(ty.parse_text("TRUE").unwrap().to_text(), "true");
        assert!(ty.parse_text("maybe").is_err());
    }

    #[test]
    fn test_array_splits_on_whitespace() {
        let ty = ValueType::Array(ScalarKind::Int);
        let value = ty.parse_text(" 1  2\t3 ").unwrap();
        assert_eq!(value, ParamValue::from(vec![1i64, 2, 3]));
        assert_eq!(value.to_text(), "1 2 3");
        assert_eq!(ty.parse_text("").unwrap(), ParamValue::Array(vec![]));
    }

    #[test]
    fn test_conform_widens_int_to_real() {
        let real = ValueType::Scalar(ScalarKind::Real);
        assert_eq!(
            ParamValue::from(2i64).conform_to(real).unwrap(),
            ParamValue::from(2.0)
        );
        assert!(ParamValue::from(2.5).conform_to(ValueType::Scalar(ScalarKind::Int)).is_err());
        assert!(ParamValue::from("x").conform_to(real).is_err());
        assert!(ParamValue::from(vec![1i64]).conform_to(real).is_err());
    }

    #[test]
    fn test_string_array_elements_must_be_words() {
        let ty = ValueType::Array(ScalarKind::String);
        assert!(ParamValue::from(vec!["left", "top"]).conform_to(ty).is_ok());
        for bad in [vec!["left side", "top"], vec!["", "top"]] {
            assert!(matches!(
                ParamValue::from(bad).conform_to(ty),
                Err(ValueError::Mismatch { .. })
            ));
        }
    }

    #[test]
    fn test_check_writable() {
        for ok in ["it's", "say\"hi\"", "a\\b", "two\nlines"] {
            assert!(ParamValue::from(ok).check_writable().is_ok(), "{}", ok);
        }
        for bad in ["it's \"x\"", "it's\nhere", "it's\\"] {
            assert_eq!(
                ParamValue::from(bad).check_writable(),
                Err(ValueError::Unwritable(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_real_formatting_reparses() {
        for v in [0.5, 1.0, 1e-5, 2.5e20, -3.25] {
            let text = Scalar::Real(v).to_string();
            assert_eq!(Scalar::parse(ScalarKind::Real, &text), Some(Scalar::Real(v)));
        }
        assert_eq!(Scalar::Real(1e-5).to_string(), "1e-5");
    }
}
