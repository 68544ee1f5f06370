//! Alias: wrap every row under a name.

use std::sync::Arc;

use quarry_core::annotated::{AnnotatedValue, ScopeRef};
use quarry_core::plan::AliasSpec;

use crate::context::Context;
use crate::operator::{ConsumerStage, Operator};

pub struct Alias {
    spec: Arc<AliasSpec>,
    parent: Option<ScopeRef>,
}

impl Alias {
    pub(crate) fn new(spec: &Arc<AliasSpec>) -> Self {
        Self {
            spec: Arc::clone(spec),
            parent: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.parent = None;
    }
}

impl ConsumerStage for Alias {
    fn before_items(&mut self, _op: &Operator, _ctx: &Context, parent: Option<&ScopeRef>) -> bool {
        self.parent = parent.cloned();
        true
    }

    fn process_item(&mut self, op: &Operator, ctx: &Context, item: AnnotatedValue) -> bool {
        crate::fail_point!("alias.process_item");
        // A primary-term alias inherits the enclosing scope (e.g. WITH bindings).
        let mut row = if self.spec.primary {
            AnnotatedValue::nested_scope(self.parent.clone())
        } else {
            AnnotatedValue::default()
        };
        row.share_annotations(&item);
        let before = item.size();
        row.set_field(self.spec.alias.clone(), item.into_value());
        if let Err(e) = ctx.retrack_value_size(before, row.size()) {
            ctx.fatal(e);
            return false;
        }
        op.send_item(ctx, row)
    }
}
