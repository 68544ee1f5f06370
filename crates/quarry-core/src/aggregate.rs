//! Aggregate functions as three-step state machines.
//!
//! Raw rows are folded with [`Aggregate::cumulate_initial`], partial states
//! from sibling instances merge with the associative
//! [`Aggregate::cumulate_intermediate`], and [`Aggregate::compute_final`]
//! turns a fully merged state into the user-visible value. States are plain
//! [`Value`]s so they can ride on a row's `aggregates` attachment.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::annotated::AnnotatedValue;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::value::Value;

const AVG_SUM: &str = "sum";
const AVG_COUNT: &str = "count";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fn", content = "arg", rename_all = "snake_case")]
pub enum Aggregate {
    CountStar,
    Count(Expr),
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    ArrayAgg(Expr),
}

impl Aggregate {
    /// Identity string; keys the state inside the `aggregates` attachment.
    pub fn identity(&self) -> String {
        self.to_string()
    }

    /// Final value for a group that saw no rows.
    pub fn default_value(&self) -> Value {
        match self {
            Aggregate::CountStar | Aggregate::Count(_) => Value::Int(0),
            _ => Value::Null,
        }
    }

    /// State before any row has been folded in.
    pub fn initial_state(&self) -> Value {
        self.default_value()
    }

    /// Fold one raw row into `state`.
    pub fn cumulate_initial(&self, item: &AnnotatedValue, state: Value) -> Result<Value> {
        match self {
            Aggregate::CountStar => self.add_count(state, 1),
            Aggregate::Count(e) => {
                if e.evaluate(item)?.is_unknown() {
                    Ok(state)
                } else {
                    self.add_count(state, 1)
                }
            }
            Aggregate::Sum(e) => {
                let v = e.evaluate(item)?;
                if v.as_f64().is_none() {
                    return Ok(state);
                }
                self.merge(&v, state)
            }
            Aggregate::Avg(e) => {
                let v = e.evaluate(item)?;
                if v.as_f64().is_none() {
                    return Ok(state);
                }
                let mut part = Value::empty_object();
                part.set_field(AVG_SUM, v);
                part.set_field(AVG_COUNT, Value::Int(1));
                self.merge(&part, state)
            }
            Aggregate::Min(e) | Aggregate::Max(e) | Aggregate::ArrayAgg(e) => {
                let v = e.evaluate(item)?;
                match self {
                    Aggregate::ArrayAgg(_) if v.is_missing() => Ok(state),
                    Aggregate::ArrayAgg(_) => self.merge(&Value::Array(vec![v]), state),
                    _ => self.merge(&v, state),
                }
            }
        }
    }

    /// Merge a partial state produced elsewhere into `cumulative`.
    pub fn cumulate_intermediate(&self, part: &Value, cumulative: Value) -> Result<Value> {
        self.merge(part, cumulative)
    }

    /// Turn a merged state into the user-visible value.
    pub fn compute_final(&self, state: Value) -> Result<Value> {
        match self {
            Aggregate::Avg(_) => {
                if state.is_unknown() {
                    return Ok(Value::Null);
                }
                let (sum, count) = self.avg_parts(&state)?;
                if count == 0.0 {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Float(sum / count))
                }
            }
            Aggregate::CountStar | Aggregate::Count(_) if state.is_unknown() => Ok(Value::Int(0)),
            _ => Ok(state),
        }
    }

    fn merge(&self, part: &Value, cumulative: Value) -> Result<Value> {
        if part.is_unknown() {
            return Ok(cumulative);
        }
        if cumulative.is_unknown() {
            return Ok(part.clone());
        }
        match self {
            Aggregate::CountStar | Aggregate::Count(_) => {
                let n = self.count_of(part)?;
                self.add_count(cumulative, n)
            }
            Aggregate::Sum(_) => {
                self.number_of(part)?;
                self.number_of(&cumulative)?;
                Ok(add_numbers(&cumulative, part))
            }
            Aggregate::Avg(_) => {
                let (s1, c1) = self.avg_parts(part)?;
                let (s2, c2) = self.avg_parts(&cumulative)?;
                let mut out = Value::empty_object();
                out.set_field(AVG_SUM, normalized(Value::Float(s1 + s2)));
                out.set_field(AVG_COUNT, Value::Int((c1 + c2) as i64));
                Ok(out)
            }
            Aggregate::Min(_) => Ok(match part.collate(&cumulative) {
                Ordering::Less => part.clone(),
                _ => cumulative,
            }),
            Aggregate::Max(_) => Ok(match part.collate(&cumulative) {
                Ordering::Greater => part.clone(),
                _ => cumulative,
            }),
            Aggregate::ArrayAgg(_) => match (cumulative, part) {
                (Value::Array(mut acc), Value::Array(more)) => {
                    acc.extend(more.iter().cloned());
                    Ok(Value::Array(acc))
                }
                _ => Err(self.bad_state("expected array state")),
            },
        }
    }

    fn add_count(&self, state: Value, n: i64) -> Result<Value> {
        let current = if state.is_unknown() {
            0
        } else {
            self.count_of(&state)?
        };
        Ok(Value::Int(current + n))
    }

    fn count_of(&self, v: &Value) -> Result<i64> {
        match v {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            _ => Err(self.bad_state("expected integral count")),
        }
    }

    fn number_of(&self, v: &Value) -> Result<f64> {
        v.as_f64().ok_or_else(|| self.bad_state("expected number"))
    }

    fn avg_parts(&self, v: &Value) -> Result<(f64, f64)> {
        match (v.field(AVG_SUM).as_f64(), v.field(AVG_COUNT).as_f64()) {
            (Some(sum), Some(count)) => Ok((sum, count)),
            _ => Err(self.bad_state("expected {sum, count}")),
        }
    }

    fn bad_state(&self, detail: &str) -> Error {
        Error::AggregateState {
            aggregate: self.identity(),
            detail: detail.to_string(),
        }
    }
}

fn add_numbers(a: &Value, b: &Value) -> Value {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        if let Some(sum) = x.checked_add(*y) {
            return Value::Int(sum);
        }
    }
    Value::Float(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
}

/// Integral floats collapse to integers.
fn normalized(v: Value) -> Value {
    match v {
        Value::Float(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
            Value::Int(f as i64)
        }
        other => other,
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::CountStar => f.write_str("count(*)"),
            Aggregate::Count(e) => write!(f, "count({e})"),
            Aggregate::Sum(e) => write!(f, "sum({e})"),
            Aggregate::Avg(e) => write!(f, "avg({e})"),
            Aggregate::Min(e) => write!(f, "min({e})"),
            Aggregate::Max(e) => write!(f, "max({e})"),
            Aggregate::ArrayAgg(e) => write!(f, "array_agg({e})"),
        }
    }
}
