use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::error::TagRunError;

pub type VarMap = BTreeMap<String, TrValue>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TrValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<TrValue>),
    Map(BTreeMap<String, TrValue>),
    Iter(IterCursor),
    Handler(ExceptionHandlerRef),
}

/// Receives the variable mapping visible at the point a tag failed.
pub trait ExceptionSink: Send + Sync {
    fn handle(&self, vars: &VarMap) -> Result<(), TagRunError>;
}

#[derive(Clone)]
pub struct ExceptionHandlerRef(pub Arc<dyn ExceptionSink>);

impl ExceptionHandlerRef {
    pub fn new(sink: impl ExceptionSink + 'static) -> Self {
        Self(Arc::new(sink))
    }
}

impl fmt::Debug for ExceptionHandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExceptionHandlerRef")
    }
}

impl PartialEq for ExceptionHandlerRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Position over a materialized sequence. Copies advance independently.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IterCursor {
    items: Vec<TrValue>,
    position: usize,
}

impl IterCursor {
    pub fn new(items: Vec<TrValue>) -> Self {
        Self { items, position: 0 }
    }

    pub fn remaining(&self) -> &[TrValue] {
        &self.items[self.position.min(self.items.len())..]
    }
}

impl Iterator for IterCursor {
    type Item = TrValue;

    fn next(&mut self) -> Option<TrValue> {
        let item = self.items.get(self.position).cloned()?;
        self.position += 1;
        Some(item)
    }
}

impl TrValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::String(value) => !value.is_empty(),
            Self::Array(values) => !values.is_empty(),
            Self::Map(values) => !values.is_empty(),
            Self::Iter(_) | Self::Handler(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Iter(_) => "iterator",
            Self::Handler(_) => "handler",
        }
    }

    /// Text form used for substitution, comparisons and delimited output.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => match integral_i64(*value) {
                Some(integral) => integral.to_string(),
                None => value.to_string(),
            },
            Self::String(value) => value.clone(),
            Self::Array(_) | Self::Map(_) => self.to_json().to_string(),
            Self::Iter(_) => "<iterator>".to_string(),
            Self::Handler(_) => "<handler>".to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Equality with Int/Float compared numerically.
    pub fn loose_eq(&self, other: &TrValue) -> bool {
        match (self, other) {
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }

    pub fn compare(&self, other: &TrValue) -> Result<Ordering, TagRunError> {
        let ordering = match (self, other) {
            (Self::Int(left), Self::Int(right)) => Some(left.cmp(right)),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => self
                .as_f64()
                .zip(other.as_f64())
                .and_then(|(left, right)| left.partial_cmp(&right)),
            (Self::String(left), Self::String(right)) => Some(left.cmp(right)),
            (Self::Bool(left), Self::Bool(right)) => Some(left.cmp(right)),
            (Self::Array(left), Self::Array(right)) => {
                for (left, right) in left.iter().zip(right) {
                    let ordering = left.compare(right)?;
                    if ordering != Ordering::Equal {
                        return Ok(ordering);
                    }
                }
                Some(left.len().cmp(&right.len()))
            }
            _ => None,
        };
        ordering.ok_or_else(|| {
            TagRunError::new(
                "VALUE_NOT_COMPARABLE",
                format!(
                    "Cannot compare {} with {}.",
                    self.type_name(),
                    other.type_name()
                ),
            )
        })
    }

    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(value) => Self::Bool(value),
            JsonValue::Number(number) => match number.as_i64() {
                Some(value) => Self::Int(value),
                None => Self::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(value) => Self::String(value),
            JsonValue::Array(values) => {
                Self::Array(values.into_iter().map(Self::from_json).collect())
            }
            JsonValue::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null | Self::Iter(_) | Self::Handler(_) => JsonValue::Null,
            Self::Bool(value) => JsonValue::Bool(*value),
            Self::Int(value) => JsonValue::Number((*value).into()),
            Self::Float(value) => JsonNumber::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(value) => JsonValue::String(value.clone()),
            Self::Array(values) => JsonValue::Array(values.iter().map(Self::to_json).collect()),
            Self::Map(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<JsonMap<_, _>>(),
            ),
        }
    }
}

impl From<bool> for TrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for TrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for TrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for TrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// `value` as an `i64` when it has no fractional part and fits without saturating.
pub fn integral_i64(value: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if value.fract() == 0.0 && (-LIMIT..LIMIT).contains(&value) {
        Some(value as i64)
    } else {
        None
    }
}
