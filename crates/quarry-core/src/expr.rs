//! Minimal expression language bound into plan nodes.
//!
//! Expression semantics belong to the compiler, not the execution core; this
//! is the small, serializable subset the operators need to be exercised end
//! to end: identifiers, navigation, literals, comparison, boolean logic and
//! arithmetic. Unknown propagation follows the document model: MISSING wins
//! over NULL, NULL wins over anything else.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::annotated::AnnotatedValue;
use crate::error::{Error, Result};
use crate::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Field(Box<Expr>, String),
    Element(Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn lit(v: impl Into<Value>) -> Self {
        Expr::Literal(v.into())
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        Expr::Field(Box::new(self), name.into())
    }

    pub fn element(self, pos: Expr) -> Self {
        Expr::Element(Box::new(self), Box::new(pos))
    }

    pub fn compare(self, op: CompareOp, rhs: Expr) -> Self {
        Expr::Compare(op, Box::new(self), Box::new(rhs))
    }

    pub fn arith(self, op: ArithOp, rhs: Expr) -> Self {
        Expr::Arith(op, Box::new(self), Box::new(rhs))
    }

    /// Evaluate against one row, resolving identifiers through its scope chain.
    pub fn evaluate(&self, item: &AnnotatedValue) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => Ok(item.field(name)),
            Expr::Field(base, name) => Ok(base.evaluate(item)?.field(name)),
            Expr::Element(base, pos) => {
                let first = base.evaluate(item)?;
                let second = pos.evaluate(item)?;
                element(&first, &second)
            }
            Expr::Array(items) => items
                .iter()
                .map(|e| {
                    e.evaluate(item).map(|v| match v {
                        Value::Missing => Value::Null,
                        other => other,
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Expr::Compare(op, lhs, rhs) => {
                let l = lhs.evaluate(item)?;
                let r = rhs.evaluate(item)?;
                Ok(compare(*op, &l, &r))
            }
            Expr::Arith(op, lhs, rhs) => {
                let l = lhs.evaluate(item)?;
                let r = rhs.evaluate(item)?;
                arith(*op, &l, &r)
            }
            Expr::And(lhs, rhs) => {
                let l = lhs.evaluate(item)?;
                let r = rhs.evaluate(item)?;
                Ok(logical(&l, &r, false))
            }
            Expr::Or(lhs, rhs) => {
                let l = lhs.evaluate(item)?;
                let r = rhs.evaluate(item)?;
                Ok(logical(&l, &r, true))
            }
            Expr::Not(operand) => Ok(match operand.evaluate(item)? {
                Value::Missing => Value::Missing,
                Value::Null => Value::Null,
                Value::Bool(b) => Value::Bool(!b),
                other => Value::Bool(!other.truth()),
            }),
        }
    }
}

fn element(first: &Value, second: &Value) -> Result<Value> {
    match second {
        Value::Int(i) => return Ok(first.index(*i)),
        Value::Float(f) if f.fract() == 0.0 => return Ok(first.index(*f as i64)),
        Value::Missing => return Ok(Value::Missing),
        _ => {}
    }
    if first.is_missing() {
        Ok(Value::Missing)
    } else {
        Ok(Value::Null)
    }
}

fn unknown_of(l: &Value, r: &Value) -> Option<Value> {
    if l.is_missing() || r.is_missing() {
        Some(Value::Missing)
    } else if l.value_type() == ValueType::Null || r.value_type() == ValueType::Null {
        Some(Value::Null)
    } else {
        None
    }
}

fn compare(op: CompareOp, l: &Value, r: &Value) -> Value {
    if let Some(unknown) = unknown_of(l, r) {
        return unknown;
    }
    let ord = l.collate(r);
    Value::Bool(match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    })
}

fn arith(op: ArithOp, l: &Value, r: &Value) -> Result<Value> {
    if let Some(unknown) = unknown_of(l, r) {
        return Ok(unknown);
    }
    let (Some(x), Some(y)) = (l.as_f64(), r.as_f64()) else {
        return Ok(Value::Null);
    };
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        let exact = match op {
            ArithOp::Add => a.checked_add(*b),
            ArithOp::Sub => a.checked_sub(*b),
            ArithOp::Mul => a.checked_mul(*b),
            ArithOp::Mod if *b == 0 => return Err(Error::DivisionByZero),
            ArithOp::Mod => a.checked_rem(*b),
            ArithOp::Div => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Int(v));
        }
    }
    Ok(Value::Float(match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div | ArithOp::Mod if y == 0.0 => return Err(Error::DivisionByZero),
        ArithOp::Div => x / y,
        ArithOp::Mod => x % y,
    }))
}

/// AND (`any == false`) / OR (`any == true`) with unknown propagation.
fn logical(l: &Value, r: &Value, any: bool) -> Value {
    if matches!(l, Value::Bool(b) if *b == any) || matches!(r, Value::Bool(b) if *b == any) {
        return Value::Bool(any);
    }
    if let Some(unknown) = unknown_of(l, r) {
        return unknown;
    }
    match (l, r) {
        (Value::Bool(_), Value::Bool(_)) => Value::Bool(!any),
        _ => Value::Null,
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        })
    }
}

/// Canonical text form; doubles as the cache key for term evaluation and as
/// the aggregate identity string.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Ident(name) => write!(f, "`{name}`"),
            Expr::Field(base, name) => write!(f, "({base}.`{name}`)"),
            Expr::Element(base, pos) => write!(f, "({base}[{pos}])"),
            Expr::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Expr::Compare(op, l, r) => write!(f, "({l} {op} {r})"),
            Expr::Arith(op, l, r) => write!(f, "({l} {op} {r})"),
            Expr::And(l, r) => write!(f, "({l} and {r})"),
            Expr::Or(l, r) => write!(f, "({l} or {r})"),
            Expr::Not(e) => write!(f, "(not {e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(json: serde_json::Value) -> AnnotatedValue {
        AnnotatedValue::new(Value::from(json))
    }

    #[test]
    fn element_navigation_handles_negative_and_missing_positions() {
        let item = row(serde_json::json!({"xs": [1, 2, 3]}));
        let last = Expr::ident("xs").element(Expr::lit(-1i64));
        assert_eq!(last.evaluate(&item).unwrap(), Value::Int(3));

        let missing = Expr::ident("xs").element(Expr::ident("nope"));
        assert_eq!(missing.evaluate(&item).unwrap(), Value::Missing);

        let bad = Expr::ident("xs").element(Expr::lit("a"));
        assert_eq!(bad.evaluate(&item).unwrap(), Value::Null);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let item = row(serde_json::json!({"n": 4}));
        let e = Expr::ident("n").arith(ArithOp::Div, Expr::lit(0i64));
        assert_eq!(e.evaluate(&item), Err(Error::DivisionByZero));
    }

    #[test]
    fn and_short_circuits_on_false_before_unknowns() {
        let item = row(serde_json::json!({}));
        let e = Expr::And(Box::new(Expr::lit(false)), Box::new(Expr::ident("gone")));
        assert_eq!(e.evaluate(&item).unwrap(), Value::Bool(false));
    }
}
