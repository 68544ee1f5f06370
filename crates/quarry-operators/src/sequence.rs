//! Sequence: run child stages as a producer-to-consumer chain.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::warn;

use quarry_core::annotated::ScopeRef;

use crate::context::Context;
use crate::error::ExecError;
use crate::operator::Operator;

pub struct Sequence;

impl Sequence {
    pub(crate) fn run(&mut self, op: &Arc<Operator>, ctx: &Context, parent: Option<ScopeRef>) {
        let children = op.children();
        let Some(last) = children.len().checked_sub(1) else {
            return;
        };

        // First child reads our input, last child writes (and closes) our output.
        let mut upstream = op.base().input();
        for (i, child) in children.iter().enumerate() {
            let downstream = if i == last {
                op.base().output()
            } else {
                Some(ctx.exchange(ctx.config().pipeline_cap))
            };
            child.wire(upstream.take(), downstream.clone());
            upstream = downstream;
        }
        op.base().delegate_output();

        let handles = spawn_all(ctx, &children, parent);
        join_all(handles);
    }
}

/// Start one named thread per operator. An operator whose thread cannot be
/// started is released (closing its output) and the request turns fatal.
pub(crate) fn spawn_all(
    ctx: &Context,
    ops: &[Arc<Operator>],
    parent: Option<ScopeRef>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(ops.len());
    for child in ops {
        let mut builder = std::thread::Builder::new()
            .name(format!("quarry-{}-{}", child.name(), child.id().get()));
        if let Some(stack) = ctx.config().thread_stack_bytes {
            builder = builder.stack_size(stack);
        }
        let (c, ctx2, p) = (Arc::clone(child), ctx.clone(), parent.clone());
        match builder.spawn(move || c.run(&ctx2, p)) {
            Ok(h) => handles.push(h),
            Err(e) => {
                ctx.fatal(ExecError::Thread(e.to_string()));
                child.done();
            }
        }
    }
    handles
}

pub(crate) fn join_all(handles: Vec<JoinHandle<()>>) {
    for h in handles {
        if h.join().is_err() {
            // Operator bodies catch their own panics; this is a bug in the
            // lifecycle code itself.
            warn!("operator thread terminated abnormally");
        }
    }
}
