use std::sync::Arc;

use quarry_core::annotated::{AnnotatedValue, ScopeRef};

use crate::context::Context;
use crate::operator::Operator;

/// Emits exactly one empty object, scoped onto the parent value if any.
pub struct DummyScan;

impl DummyScan {
    pub(crate) fn run(&mut self, op: &Arc<Operator>, ctx: &Context, parent: Option<ScopeRef>) {
        crate::fail_point!("dummy_scan.run");
        let row = AnnotatedValue::nested_scope(parent);
        if op.track_row(ctx, &row) {
            op.send_item(ctx, row);
        }
    }
}
