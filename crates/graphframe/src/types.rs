use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Integer payload used by the ingestion pipeline to mark a missing numeric cell.
pub const UNDEFINED_NUMBER_SENTINEL: i32 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Point,
    Edge,
}

impl ComponentType {
    pub const ALL: [ComponentType; 2] = [ComponentType::Point, ComponentType::Edge];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Point => "point",
            ComponentType::Edge => "edge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "point" => Some(ComponentType::Point),
            "edge" => Some(ComponentType::Edge),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    Integer,
    String,
    Date,
}

impl DataType {
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            DataType::Number | DataType::Integer | DataType::String | DataType::Date
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Number => "number",
            DataType::Integer => "integer",
            DataType::String => "string",
            DataType::Date => "date",
        }
    }
}

/// A single cell. `Null` stands for any per-type undefined marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Integer(i64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            Value::Date(ms) => Some(*ms as f64),
            Value::String(s) => parse_number(s),
            Value::Null => None,
        }
    }

    /// Natural ordering within a variant, lexicographic for strings.
    /// Mixed numeric variants compare numerically; anything else falls back
    /// to the variant rank so the order stays total.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Null, Value::Null) => Ordering::Equal,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y))
                    if !matches!(a, Value::String(_)) && !matches!(b, Value::String(_)) =>
                {
                    OrderedFloat(x).cmp(&OrderedFloat(y))
                }
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Number(_) => 1,
            Value::Date(_) => 2,
            Value::String(_) => 3,
        }
    }

    /// Rendering used by CSV output and countBy bucket labels.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(n) => n.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::String(s) => s.clone(),
            Value::Date(ms) => format_date(*ms),
        }
    }
}

fn format_date(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(_) => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(ms) => serializer.serialize_str(&format_date(*ms)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Hashable projection of a defined [`Value`], used for distinct counting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Number(OrderedFloat<f64>),
    Integer(i64),
    String(String),
    Date(i64),
}

impl ValueKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(ValueKey::Number(OrderedFloat(*n))),
            Value::Integer(i) => Some(ValueKey::Integer(*i)),
            Value::String(s) => Some(ValueKey::String(s.clone())),
            Value::Date(ms) => Some(ValueKey::Date(*ms)),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ValueKey::Number(n) => Value::Number(n.into_inner()),
            ValueKey::Integer(i) => Value::Integer(*i),
            ValueKey::String(s) => Value::String(s.clone()),
            ValueKey::Date(ms) => Value::Date(*ms),
        }
    }
}

pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
}

pub fn is_undefined_number(n: f64) -> bool {
    n.is_nan() || n == UNDEFINED_NUMBER_SENTINEL as f64
}

pub fn is_undefined_string(s: &str) -> bool {
    s.is_empty() || s == "n/a" || s == "\0"
}

/// Typed storage for a column, positionally aligned with the component's global index.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Number(Vec<f64>),
    Integer(Vec<i32>),
    String(Vec<String>),
    /// Milliseconds since the Unix epoch; `None` is undefined.
    Date(Vec<Option<i64>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Number(v) => v.len(),
            ColumnValues::Integer(v) => v.len(),
            ColumnValues::String(v) => v.len(),
            ColumnValues::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnValues::Number(_) => DataType::Number,
            ColumnValues::Integer(_) => DataType::Integer,
            ColumnValues::String(_) => DataType::String,
            ColumnValues::Date(_) => DataType::Date,
        }
    }

    pub fn is_defined(&self, index: usize) -> bool {
        match self {
            ColumnValues::Number(v) => v.get(index).is_some_and(|n| !is_undefined_number(*n)),
            ColumnValues::Integer(v) => v
                .get(index)
                .is_some_and(|i| *i != UNDEFINED_NUMBER_SENTINEL),
            ColumnValues::String(v) => v.get(index).is_some_and(|s| !is_undefined_string(s)),
            ColumnValues::Date(v) => v.get(index).is_some_and(|d| d.is_some()),
        }
    }

    /// The cell at `index`, or `Value::Null` when undefined or out of range.
    pub fn value_at(&self, index: usize) -> Value {
        if !self.is_defined(index) {
            return Value::Null;
        }
        match self {
            ColumnValues::Number(v) => Value::Number(v[index]),
            ColumnValues::Integer(v) => Value::Integer(v[index] as i64),
            ColumnValues::String(v) => Value::String(v[index].clone()),
            ColumnValues::Date(v) => v[index].map(Value::Date).unwrap_or(Value::Null),
        }
    }

    /// Numeric reading of a defined cell; string cells are parsed.
    pub fn numeric_at(&self, index: usize) -> Option<f64> {
        if !self.is_defined(index) {
            return None;
        }
        match self {
            ColumnValues::Number(v) => Some(v[index]),
            ColumnValues::Integer(v) => Some(v[index] as f64),
            ColumnValues::String(v) => parse_number(&v[index]),
            ColumnValues::Date(v) => v[index].map(|ms| ms as f64),
        }
    }

    pub fn gather(&self, indices: &[u32]) -> ColumnValues {
        match self {
            ColumnValues::Number(v) => {
                ColumnValues::Number(indices.iter().map(|&i| v[i as usize]).collect())
            }
            ColumnValues::Integer(v) => {
                ColumnValues::Integer(indices.iter().map(|&i| v[i as usize]).collect())
            }
            ColumnValues::String(v) => {
                ColumnValues::String(indices.iter().map(|&i| v[i as usize].clone()).collect())
            }
            ColumnValues::Date(v) => {
                ColumnValues::Date(indices.iter().map(|&i| v[i as usize]).collect())
            }
        }
    }
}
