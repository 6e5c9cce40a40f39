//! Typed access to untyped field trees
//!
//! Declared configuration arrives as a loose JSON-like tree. [`Decoder`]
//! reads it into typed values and reports the exact path of anything that
//! does not have the expected shape.

use crate::codec::{EnumCodec, Vocabulary};
use crate::remote::Fields;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Dotted path of a field inside a tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0.join("."))
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: expected {expected}, found {found}")]
pub struct DecodeError {
    pub path: FieldPath,
    pub expected: String,
    pub found: String,
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

fn describe(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "nothing".to_string(),
        Some(Value::Bool(b)) => format!("boolean {b}"),
        Some(Value::Number(n)) => format!("number {n}"),
        Some(Value::String(s)) => format!("string \"{s}\""),
        Some(Value::Array(_)) => "a list".to_string(),
        Some(Value::Object(_)) => "an object".to_string(),
    }
}

/// Reader over one level of a field tree
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    fields: &'a Fields,
    path: FieldPath,
}

impl<'a> Decoder<'a> {
    pub fn new(fields: &'a Fields) -> Self {
        Self {
            fields,
            path: FieldPath::root(),
        }
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Value of `name`; explicit nulls count as absent
    fn value(&self, name: &str) -> Option<&'a Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    fn mismatch(&self, name: &str, expected: &str) -> DecodeError {
        DecodeError {
            path: self.path.child(name),
            expected: expected.to_string(),
            found: describe(self.fields.get(name)),
        }
    }

    pub fn required_str(&self, name: &str) -> DecodeResult<&'a str> {
        self.optional_str(name)?
            .ok_or_else(|| self.mismatch(name, "a string"))
    }

    pub fn optional_str(&self, name: &str) -> DecodeResult<Option<&'a str>> {
        match self.value(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.mismatch(name, "a string")),
        }
    }

    pub fn optional_bool(&self, name: &str) -> DecodeResult<Option<bool>> {
        match self.value(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.mismatch(name, "a boolean")),
        }
    }

    pub fn optional_u32(&self, name: &str) -> DecodeResult<Option<u32>> {
        match self.value(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.mismatch(name, "a non-negative 32-bit integer")),
            Some(_) => Err(self.mismatch(name, "a non-negative 32-bit integer")),
        }
    }

    /// Like [`optional_u32`](Self::optional_u32), but zero is rejected
    pub fn optional_positive_u32(&self, name: &str) -> DecodeResult<Option<u32>> {
        match self.optional_u32(name) {
            Ok(Some(0)) | Err(_) => Err(self.mismatch(name, "a positive 32-bit integer")),
            other => other,
        }
    }

    pub fn required_u32(&self, name: &str) -> DecodeResult<u32> {
        self.optional_u32(name)?
            .ok_or_else(|| self.mismatch(name, "a non-negative 32-bit integer"))
    }

    pub fn required_f64(&self, name: &str) -> DecodeResult<f64> {
        match self.value(name) {
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| self.mismatch(name, "a number")),
            _ => Err(self.mismatch(name, "a number")),
        }
    }

    /// List of strings; an absent field is an empty list
    pub fn string_list(&self, name: &str) -> DecodeResult<Vec<String>> {
        let items = match self.value(name) {
            None => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(self.mismatch(name, "a list of strings")),
        };

        let list_path = self.path.child(name);
        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(DecodeError {
                    path: list_path.child(&i.to_string()),
                    expected: "a string".to_string(),
                    found: describe(Some(other)),
                }),
            })
            .collect()
    }

    /// Nested object, if present
    pub fn object(&self, name: &str) -> DecodeResult<Option<Decoder<'a>>> {
        match self.value(name) {
            None => Ok(None),
            Some(Value::Object(fields)) => Ok(Some(Decoder {
                fields,
                path: self.path.child(name),
            })),
            Some(_) => Err(self.mismatch(name, "an object")),
        }
    }

    /// Closed-vocabulary value, translated through `codec`
    pub fn enumeration<T: Vocabulary>(&self, name: &str, codec: &EnumCodec<T>) -> DecodeResult<T> {
        let raw = self.required_str(name)?;
        codec.decode(raw).ok_or_else(|| DecodeError {
            path: self.path.child(name),
            expected: format!("one of {}", codec.names().join(", ")),
            found: format!("\"{raw}\""),
        })
    }
}
