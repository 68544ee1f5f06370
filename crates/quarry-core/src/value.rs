//! JSON-like document values with a distinct MISSING state.
//!
//! Collation follows the document-store ordering used by ORDER BY and MIN/MAX:
//! `MISSING < NULL < FALSE < TRUE < numbers < strings < arrays < objects`.
//! Serialization goes through `serde_json::Value`; MISSING has no JSON form and
//! is dropped from objects (and rendered as `null` anywhere else).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

/// Type tags in collation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Missing,
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Missing,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn empty_object() -> Self {
        Value::Object(BTreeMap::new())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Missing => ValueType::Missing,
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Boolean,
            Value::Int(_) | Value::Float(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// True for values on the NULL/MISSING side of the collation boundary.
    pub fn is_unknown(&self) -> bool {
        self.value_type() <= ValueType::Null
    }

    /// Truthiness used by filters: unknowns, `false`, zero and empty
    /// strings/arrays/objects are false.
    pub fn truth(&self) -> bool {
        match self {
            Value::Missing | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn field_ref(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Field lookup; MISSING when absent or when `self` is not an object.
    pub fn field(&self, name: &str) -> Value {
        self.field_ref(name).cloned().unwrap_or(Value::Missing)
    }

    /// Set a field, turning `self` into an object first if it is not one.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        if !matches!(self, Value::Object(_)) {
            *self = Value::empty_object();
        }
        if let Value::Object(fields) = self {
            fields.insert(name.into(), value);
        }
    }

    /// Array element; negative positions count from the end.
    pub fn index(&self, pos: i64) -> Value {
        let Value::Array(items) = self else {
            return Value::Missing;
        };
        let len = items.len() as i64;
        let pos = if pos < 0 { len + pos } else { pos };
        if pos < 0 || pos >= len {
            return Value::Missing;
        }
        items[pos as usize].clone()
    }

    /// Total order used by ORDER BY, MIN and MAX.
    pub fn collate(&self, other: &Value) -> Ordering {
        let (lt, rt) = (self.value_type(), other.value_type());
        if lt != rt {
            return lt.cmp(&rt);
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.collate(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => collate_objects(a, b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                // NaN sorts below every other number and equal to itself.
                (Some(x), Some(y)) => match (x.is_nan(), y.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                },
                // Same type, no payload: MISSING/MISSING or NULL/NULL.
                _ => Ordering::Equal,
            },
        }
    }

    /// Rough in-memory footprint in bytes, used for request quota accounting.
    pub fn size(&self) -> usize {
        match self {
            Value::Missing | Value::Null | Value::Bool(_) => 8,
            Value::Int(_) | Value::Float(_) => 16,
            Value::String(s) => 24 + s.len(),
            Value::Array(items) => 24 + items.iter().map(Value::size).sum::<usize>(),
            Value::Object(fields) => {
                48 + fields
                    .iter()
                    .map(|(k, v)| 24 + k.len() + v.size())
                    .sum::<usize>()
            }
        }
    }

    /// Append a stable encoding of this value to `out`.
    ///
    /// Equal values (under collation) encode identically: integral floats are
    /// written as integers and object keys are already sorted. MISSING is
    /// written as a bare `missing` token so it never collides with `null`.
    pub fn write_key(&self, out: &mut String) {
        match self {
            Value::Missing => out.push_str("missing"),
            Value::Null => out.push_str("null"),
            Value::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Value::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                    let _ = write!(out, "{}", *f as i64);
                } else {
                    let _ = write!(out, "{f:?}");
                }
            }
            Value::String(s) => {
                let _ = write!(out, "{}", serde_json::Value::String(s.clone()));
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_key(out);
                }
                out.push(']');
            }
            Value::Object(fields) => {
                out.push('{');
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}:", serde_json::Value::String(k.clone()));
                    v.write_key(out);
                }
                out.push('}');
            }
        }
    }
}

/// Objects collate by size, then by sorted key names, then by values.
fn collate_objects(a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Ordering {
    match a.len().cmp(&b.len()) {
        Ordering::Equal => {}
        other => return other,
    }
    for (ka, kb) in a.keys().zip(b.keys()) {
        match ka.cmp(kb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    for (va, vb) in a.values().zip(b.values()) {
        match va.collate(vb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Missing | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .filter(|(_, v)| !v.is_missing())
                    .map(|(k, v)| (k, v.into()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => f.write_str("missing"),
            other => write!(f, "{}", serde_json::Value::from(other.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collation_crosses_types_in_fixed_order() {
        let ordered = vec![
            Value::Missing,
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Int(-3),
            Value::Float(2.5),
            Value::from("a"),
            Value::Array(vec![]),
            Value::empty_object(),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(pair[0].collate(&pair[1]), Ordering::Less, "{:?}", pair);
        }
        assert_eq!(Value::Int(8).collate(&Value::Float(8.0)), Ordering::Equal);
    }

    #[test]
    fn nan_sorts_below_every_number() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan.collate(&Value::Int(i64::MIN)), Ordering::Less);
        assert_eq!(nan.collate(&Value::Float(f64::NEG_INFINITY)), Ordering::Less);
        assert_eq!(Value::Int(0).collate(&nan), Ordering::Greater);
        assert_eq!(nan.collate(&Value::Float(f64::NAN)), Ordering::Equal);
        assert_eq!(Value::Bool(true).collate(&nan), Ordering::Less);
    }

    #[test]
    fn key_encoding_unifies_integral_numbers_and_separates_missing() {
        let mut a = String::new();
        let mut b = String::new();
        Value::Int(8).write_key(&mut a);
        Value::Float(8.0).write_key(&mut b);
        assert_eq!(a, b);

        let mut m = String::new();
        let mut n = String::new();
        Value::Missing.write_key(&mut m);
        Value::Null.write_key(&mut n);
        assert_ne!(m, n);
    }

    #[test]
    fn missing_fields_are_dropped_from_json() {
        let mut v = Value::empty_object();
        v.set_field("a", Value::Int(1));
        v.set_field("b", Value::Missing);
        assert_eq!(serde_json::Value::from(v), serde_json::json!({"a": 1}));
    }
}
