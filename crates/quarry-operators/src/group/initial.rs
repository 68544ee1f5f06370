use std::collections::BTreeMap;

use quarry_core::annotated::{AnnotatedValue, Attachment, AGGREGATES};
use quarry_core::plan::GroupSpec;
use quarry_mem::pool::GroupTable;

use crate::context::Context;
use crate::error::ExecError;

/// Fold a raw row into its group's partial state.
pub(super) fn fold(
    spec: &GroupSpec,
    table: &mut GroupTable,
    key: String,
    mut item: AnnotatedValue,
    ctx: &Context,
) -> bool {
    if let Some(entry) = table.get_mut(&key) {
        let Some(states) = entry.aggregates_mut() else {
            ctx.fatal(ExecError::InvalidValue(
                "Invalid or missing cumulative aggregates.".into(),
            ));
            return false;
        };
        for agg in &spec.aggregates {
            let id = agg.identity();
            let state = states.remove(&id).unwrap_or_else(|| agg.initial_state());
            match agg.cumulate_initial(&item, state) {
                Ok(v) => {
                    states.insert(id, v);
                }
                Err(e) => {
                    ctx.fatal(ExecError::GroupUpdate(format!(
                        "Error updating initial GROUP value: {e}"
                    )));
                    return false;
                }
            }
        }
        ctx.release_value_size(item.size());
        return true;
    }

    let before = item.size();
    let mut states = BTreeMap::new();
    for agg in &spec.aggregates {
        match agg.cumulate_initial(&item, agg.initial_state()) {
            Ok(v) => {
                states.insert(agg.identity(), v);
            }
            Err(e) => {
                ctx.fatal(ExecError::GroupUpdate(format!(
                    "Error updating initial GROUP value: {e}"
                )));
                return false;
            }
        }
    }
    item.set_attachment(AGGREGATES, Attachment::Aggregates(states));
    if let Err(e) = ctx.retrack_value_size(before, item.size()) {
        ctx.fatal(e);
        return false;
    }
    table.insert(key, item);
    true
}
