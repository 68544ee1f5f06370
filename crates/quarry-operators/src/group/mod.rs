//! Streaming GROUP BY in three composable steps.
//!
//! `Initial` folds raw rows into partial aggregate state, `Intermediate`
//! merges partial states coming from sibling instances, and `Final` turns
//! merged state into values. All three are barriers: rows are buffered in a
//! pooled table keyed by the encoded group key and emitted once input ends.

mod final_group;
mod initial;
mod intermediate;
mod key;

use std::sync::Arc;

use quarry_core::annotated::{AnnotatedValue, ScopeRef};
use quarry_core::plan::GroupSpec;
use quarry_mem::pool::GroupTable;
use quarry_mem::Pools;

use crate::context::Context;
use crate::operator::{ConsumerStage, Operator};

pub use key::group_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Initial,
    Intermediate,
    Final,
}

pub struct Group {
    kind: GroupKind,
    spec: Arc<GroupSpec>,
    table: Option<GroupTable>,
}

impl Group {
    pub(crate) fn new(kind: GroupKind, spec: &Arc<GroupSpec>) -> Self {
        Self {
            kind,
            spec: Arc::clone(spec),
            table: None,
        }
    }

    pub(crate) fn release(&mut self, pools: &Pools) {
        if let Some(table) = self.table.take() {
            pools.group_tables.put(table);
        }
    }

    /// Encoded key for `item`; a failure is fatal.
    fn key_of(&self, ctx: &Context, item: &AnnotatedValue) -> Option<String> {
        match group_key(&self.spec.keys, item) {
            Ok(k) => Some(k),
            Err(e) => {
                ctx.fatal(crate::error::ExecError::evaluation("GROUP key", e));
                None
            }
        }
    }
}

impl ConsumerStage for Group {
    fn before_items(&mut self, op: &Operator, ctx: &Context, _parent: Option<&ScopeRef>) -> bool {
        if self.table.is_none() {
            self.table = Some(ctx.pools().group_tables.get());
        }
        tracing::debug!(op = op.name(), kind = ?self.kind, "group accepting rows");
        true
    }

    fn process_item(&mut self, _op: &Operator, ctx: &Context, item: AnnotatedValue) -> bool {
        crate::fail_point!("group.process_item");
        let Some(key) = self.key_of(ctx, &item) else {
            return false;
        };
        let Some(table) = self.table.as_mut() else {
            return false;
        };
        match self.kind {
            GroupKind::Initial => initial::fold(&self.spec, table, key, item, ctx),
            GroupKind::Intermediate => intermediate::merge(&self.spec, table, key, item, ctx),
            GroupKind::Final => final_group::finalize(&self.spec, table, key, item, ctx),
        }
    }

    fn after_items(&mut self, op: &Operator, ctx: &Context) {
        let Some(table) = self.table.as_mut() else {
            return;
        };
        let empty = table.is_empty();
        let mut rows = table.drain();
        while let Some((_, row)) = rows.next() {
            if !op.send_item(ctx, row) {
                rows.for_each(|(_, row)| ctx.discard(row));
                return;
            }
        }
        if self.kind == GroupKind::Final && empty && self.spec.keys.is_empty() {
            final_group::send_default(&self.spec, op, ctx);
        }
    }
}
