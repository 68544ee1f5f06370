use quarry_core::annotated::AnnotatedValue;
use quarry_core::plan::GroupSpec;
use quarry_core::value::Value;
use quarry_mem::pool::GroupTable;

use crate::context::Context;
use crate::error::ExecError;

/// Merge a row carrying partial state into its group.
///
/// The first row of a key seeds the table as-is; later rows give up their
/// partial state and are dropped.
pub(super) fn merge(
    spec: &GroupSpec,
    table: &mut GroupTable,
    key: String,
    item: AnnotatedValue,
    ctx: &Context,
) -> bool {
    let Some(entry) = table.get_mut(&key) else {
        table.insert(key, item);
        return true;
    };

    let Some(part) = item.aggregates() else {
        ctx.fatal(ExecError::InvalidValue(
            "Invalid or missing partial aggregates.".into(),
        ));
        return false;
    };
    let Some(cumulative) = entry.aggregates_mut() else {
        ctx.fatal(ExecError::InvalidValue(
            "Invalid or missing cumulative aggregates.".into(),
        ));
        return false;
    };

    for agg in &spec.aggregates {
        let id = agg.identity();
        let p = part.get(&id).unwrap_or(&Value::Missing);
        let acc = cumulative.remove(&id).unwrap_or(Value::Missing);
        match agg.cumulate_intermediate(p, acc) {
            Ok(v) => {
                cumulative.insert(id, v);
            }
            Err(e) => {
                ctx.fatal(ExecError::GroupUpdate(format!(
                    "Error updating intermediate GROUP value: {e}"
                )));
                return false;
            }
        }
    }

    ctx.release_value_size(item.size());
    true
}
