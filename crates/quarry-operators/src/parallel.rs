//! Parallel: `n` sibling copies of one stage sharing an input and an output.

use std::sync::Arc;

use quarry_core::annotated::ScopeRef;

use crate::context::Context;
use crate::operator::Operator;
use crate::sequence::{join_all, spawn_all};

pub struct Parallel;

impl Parallel {
    pub(crate) fn run(&mut self, op: &Arc<Operator>, ctx: &Context, parent: Option<ScopeRef>) {
        let children = op.children();
        if children.is_empty() {
            return;
        }
        let input = op.base().input();
        let output = op.base().output();

        // Our single producer handle becomes one handle per copy.
        if let Some(out) = &output {
            out.add_producers(children.len() - 1);
        }
        op.base().delegate_output();
        for child in &children {
            child.wire(input.clone(), output.clone());
        }

        let handles = spawn_all(ctx, &children, parent);
        join_all(handles);
    }
}
