use std::collections::BTreeMap;

use quarry_core::annotated::{AnnotatedValue, Attachment, AGGREGATES};
use quarry_core::plan::GroupSpec;
use quarry_core::value::Value;
use quarry_mem::pool::GroupTable;

use crate::context::Context;
use crate::error::ExecError;
use crate::operator::Operator;

/// Seed the group and replace each partial state by its final value.
///
/// Each key must reach the final stage exactly once.
pub(super) fn finalize(
    spec: &GroupSpec,
    table: &mut GroupTable,
    key: String,
    mut item: AnnotatedValue,
    ctx: &Context,
) -> bool {
    if table.contains_key(&key) {
        ctx.fatal(ExecError::DuplicateFinalGroup { key });
        return false;
    }

    let before = item.size();
    let Some(states) = item.aggregates_mut() else {
        ctx.fatal(ExecError::InvalidValue(
            "Invalid or missing aggregates.".into(),
        ));
        return false;
    };
    for agg in &spec.aggregates {
        let id = agg.identity();
        let state = states.remove(&id).unwrap_or(Value::Missing);
        match agg.compute_final(state) {
            Ok(v) => {
                states.insert(id, v);
            }
            Err(e) => {
                ctx.fatal(ExecError::GroupUpdate(format!(
                    "Error updating final GROUP value: {e}"
                )));
                return false;
            }
        }
    }

    if let Err(e) = ctx.retrack_value_size(before, item.size()) {
        ctx.fatal(e);
        return false;
    }
    table.insert(key, item);
    true
}

/// No input and no keys: one row of aggregate defaults.
pub(super) fn send_default(spec: &GroupSpec, op: &Operator, ctx: &Context) {
    let mut row = AnnotatedValue::new(Value::Null);
    let defaults: BTreeMap<String, Value> = spec
        .aggregates
        .iter()
        .map(|agg| (agg.identity(), agg.default_value()))
        .collect();
    row.set_attachment(AGGREGATES, Attachment::Aggregates(defaults));

    if op.track_row(ctx, &row) {
        op.send_item(ctx, row);
    }
}
