//! ORDER BY: buffer everything, sort once, stream the result.

use std::cmp::Ordering;
use std::sync::Arc;

use quarry_core::annotated::{AnnotatedValue, ScopeRef};
use quarry_core::expr::Expr;
use quarry_core::plan::OrderSpec;
use quarry_core::value::Value;
use quarry_mem::pool::RowBuffer;
use quarry_mem::Pools;

use crate::context::Context;
use crate::error::ExecError;
use crate::operator::{ConsumerStage, Operator};
use crate::phase::Phase;

/// A sort term resolved once per run.
#[derive(Debug, Clone)]
struct Term {
    expr: Expr,
    text: String,
    descending: bool,
    nulls_last: bool,
}

pub struct Order {
    spec: Arc<OrderSpec>,
    terms: Vec<Term>,
    values: Option<RowBuffer>,
}

impl Order {
    pub(crate) fn new(spec: &Arc<OrderSpec>) -> Self {
        Self {
            spec: Arc::clone(spec),
            terms: Vec::new(),
            values: None,
        }
    }

    pub(crate) fn release(&mut self, pools: &Pools) {
        if let Some(values) = self.values.take() {
            pools.row_buffers.put(values);
        }
        self.terms.clear();
    }

    fn setup_terms(&mut self) {
        self.terms = self
            .spec
            .terms
            .iter()
            .map(|t| Term {
                text: t.expr.to_string(),
                expr: t.expr.clone(),
                descending: t.descending,
                nulls_last: t.resolved_nulls_last(),
            })
            .collect();
    }

    /// Evaluate every term once per row into the row's cache. A failing term
    /// is cached as MISSING so the comparator stays a total order.
    fn prime_cache(&self, ctx: &Context, values: &mut [AnnotatedValue]) {
        let mut reported = false;
        for row in values.iter_mut() {
            for term in &self.terms {
                if row.cached_value(&term.text).is_some() {
                    continue;
                }
                let v = match term.expr.evaluate(row) {
                    Ok(v) => v,
                    Err(e) => {
                        if !reported {
                            ctx.error(ExecError::evaluation("ORDER BY", e));
                            reported = true;
                        }
                        Value::Missing
                    }
                };
                row.set_cached_value(term.text.clone(), v);
            }
        }
    }
}

fn compare_rows(terms: &[Term], a: &AnnotatedValue, b: &AnnotatedValue) -> Ordering {
    static MISSING: Value = Value::Missing;
    for term in terms {
        let va = a.cached_value(&term.text).unwrap_or(&MISSING);
        let vb = b.cached_value(&term.text).unwrap_or(&MISSING);

        let standard = (term.descending && term.nulls_last)
            || (!term.descending && !term.nulls_last)
            || va.is_unknown() == vb.is_unknown();
        let ord = if standard {
            va.collate(vb)
        } else if va.is_unknown() {
            Ordering::Greater
        } else {
            Ordering::Less
        };

        if ord != Ordering::Equal {
            return if term.descending { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}

impl ConsumerStage for Order {
    fn before_items(&mut self, _op: &Operator, ctx: &Context, _parent: Option<&ScopeRef>) -> bool {
        self.setup_terms();
        if self.values.is_none() {
            self.values = Some(ctx.pools().row_buffers.get());
        }
        true
    }

    fn process_item(&mut self, _op: &Operator, ctx: &Context, item: AnnotatedValue) -> bool {
        let Some(values) = self.values.as_mut() else {
            return false;
        };
        if values.len() == values.capacity() {
            let mut grown = Vec::with_capacity((values.capacity() * 2).max(ctx.pools().order_cap()));
            grown.append(values);
            let old = std::mem::replace(values, grown);
            ctx.pools().row_buffers.put(old);
        }
        values.push(item);
        true
    }

    fn after_items(&mut self, op: &Operator, ctx: &Context) {
        // Cancelled: no sort, no output.
        if !op.base().is_active() || ctx.is_fatal() {
            if let Some(values) = self.values.as_mut() {
                values.drain(..).for_each(|row| ctx.discard(row));
            }
            return;
        }
        let Some(mut values) = self.values.take() else {
            return;
        };

        op.base().switch_phase(ctx, Phase::Sort);
        crate::fail_point!("order.sort");
        self.prime_cache(ctx, &mut values);
        let terms = &self.terms;
        values.sort_by(|a, b| compare_rows(terms, a, b));
        op.base().switch_phase(ctx, Phase::Exec);

        let n = values.len() as u64;
        ctx.set_sort_count(n);
        ctx.add_phase_count(Phase::Sort, n);

        let mut rows = values.drain(..);
        for row in rows.by_ref() {
            if !op.send_item(ctx, row) {
                break;
            }
        }
        rows.for_each(|row| ctx.discard(row));
        self.values = Some(values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::plan::SortTerm;

    fn rows(vals: &[Option<i64>]) -> Vec<AnnotatedValue> {
        vals.iter()
            .map(|v| {
                let mut row = AnnotatedValue::default();
                row.set_field("v", v.map(Value::Int).unwrap_or(Value::Null));
                row
            })
            .collect()
    }

    fn sorted(term: SortTerm, input: &[Option<i64>]) -> Vec<Value> {
        let ctx = Context::builder(Default::default()).build();
        let mut order = Order::new(&Arc::new(OrderSpec { terms: vec![term] }));
        order.setup_terms();
        let mut values = rows(input);
        order.prime_cache(&ctx, &mut values);
        values.sort_by(|a, b| compare_rows(&order.terms, a, b));
        values.iter().map(|r| r.field("v")).collect()
    }

    #[test]
    fn direction_and_null_placement_combinations() {
        let input = [Some(5), None, Some(3), None, Some(1)];
        let e = || Expr::ident("v");
        let ints = |xs: &[Option<i64>]| -> Vec<Value> {
            xs.iter().map(|v| v.map(Value::Int).unwrap_or(Value::Null)).collect()
        };

        assert_eq!(
            sorted(SortTerm::asc(e()), &input),
            ints(&[None, None, Some(1), Some(3), Some(5)])
        );
        assert_eq!(
            sorted(SortTerm::asc(e()).with_nulls_last(true), &input),
            ints(&[Some(1), Some(3), Some(5), None, None])
        );
        assert_eq!(
            sorted(SortTerm::desc(e()), &input),
            ints(&[Some(5), Some(3), Some(1), None, None])
        );
        assert_eq!(
            sorted(SortTerm::desc(e()).with_nulls_last(false), &input),
            ints(&[None, None, Some(5), Some(3), Some(1)])
        );
    }
}
