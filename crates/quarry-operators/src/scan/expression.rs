use std::sync::Arc;

use quarry_core::annotated::{AnnotatedValue, ScopeRef};
use quarry_core::plan::ExpressionScanSpec;
use quarry_core::value::Value;

use crate::context::Context;
use crate::error::ExecError;
use crate::operator::Operator;

/// Turns one evaluated expression into rows bound under an alias.
///
/// Arrays yield their elements, NULL yields a single NULL item, MISSING
/// yields nothing and any other value yields itself. Rows of a
/// non-correlated expression are cached and replayed after `reopen`.
pub struct ExpressionScan {
    spec: Arc<ExpressionScanSpec>,
    cached: Option<Vec<AnnotatedValue>>,
}

impl ExpressionScan {
    pub(crate) fn new(spec: &Arc<ExpressionScanSpec>) -> Self {
        Self {
            spec: Arc::clone(spec),
            cached: None,
        }
    }

    pub(crate) fn run(&mut self, op: &Arc<Operator>, ctx: &Context, parent: Option<ScopeRef>) {
        crate::fail_point!("expression_scan.run");
        let correlated = self.spec.correlated;

        if !correlated {
            if let Some(rows) = &self.cached {
                for row in rows {
                    if !op.track_row(ctx, row) || !op.send_item(ctx, row.clone()) {
                        break;
                    }
                }
                return;
            }
        }

        let scope = match &parent {
            Some(p) => AnnotatedValue::nested_scope(Some(Arc::clone(p))),
            None => AnnotatedValue::default(),
        };
        let evaluated = match self.spec.expr.evaluate(&scope) {
            Ok(v) => v,
            Err(e) => {
                ctx.error(ExecError::evaluation("ExpressionScan", e));
                return;
            }
        };
        let items = match evaluated {
            Value::Array(items) => items,
            Value::Missing => Vec::new(),
            other => vec![other],
        };

        let mut results = Vec::with_capacity(if correlated { 0 } else { items.len() });
        let mut sending = true;
        for item in items {
            let mut row = AnnotatedValue::nested_scope(parent.clone());
            row.set_field(self.spec.alias.clone(), item);

            if let Some(filter) = &self.spec.filter {
                match filter.evaluate(&row) {
                    Ok(v) if v.truth() => {}
                    Ok(_) => continue,
                    Err(e) => {
                        ctx.error(ExecError::evaluation("expression scan filter", e));
                        return;
                    }
                }
            }

            if !correlated {
                results.push(row.clone());
            }
            if sending {
                sending = op.track_row(ctx, &row) && op.send_item(ctx, row);
            }
            if !sending && correlated {
                break;
            }
        }

        if !correlated {
            self.cached = Some(results);
        }
    }
}
